//! Executing a single fragment against a kernel.

use std::time::Duration;

use crate::config::ExecutorConfig;
use crate::kernel::{KernelChannels, ReplyStatus, RequestId, Telemetry, TelemetryKind};

use super::cluster::{ClusterGuard, MembershipService};
use super::outcome::{CodeFragment, ExecutionOutcome, FragmentResult};

/// Sends fragments to a kernel and collects what they produce.
///
/// Fragments are strictly sequential: `execute` does not return until the
/// fragment's telemetry burst has ended, so two fragments' events never
/// interleave.
pub struct CellExecutor<C, M> {
    /// Control and telemetry channels.
    channels: C,
    /// Waits out cluster start/stop directives.
    guard: ClusterGuard<M>,
    /// Bound on the synchronous reply.
    reply_timeout: Duration,
    /// Per-poll bound while draining telemetry.
    telemetry_quiet: Duration,
}

impl<C: KernelChannels, M: MembershipService> CellExecutor<C, M> {
    /// Create an executor.
    pub fn new(channels: C, guard: ClusterGuard<M>, config: &ExecutorConfig) -> Self {
        Self {
            channels,
            guard,
            reply_timeout: config.reply_timeout,
            telemetry_quiet: config.telemetry_quiet,
        }
    }

    /// Borrow the channels.
    pub fn channels(&self) -> &C {
        &self.channels
    }

    /// Execute one fragment.
    ///
    /// Never fails: reply timeouts and kernel errors are logged and reported
    /// through [`FragmentResult::failed`].
    pub async fn execute(&mut self, fragment: &CodeFragment<'_>) -> FragmentResult {
        if !fragment.is_executable() {
            return FragmentResult::empty(fragment.sequence);
        }
        let code = fragment.text;

        let request = match self.channels.send_code(code).await {
            Ok(request) => request,
            Err(e) => {
                report_failure(code, &e.to_string(), &[]);
                return FragmentResult::failed(fragment.sequence);
            }
        };

        let mut failed = false;
        match self.channels.await_reply(&request, self.reply_timeout).await {
            Ok(ReplyStatus::Ok) => {}
            Ok(ReplyStatus::Error {
                ename,
                evalue,
                traceback,
            }) => {
                failed = true;
                report_failure(code, &format!("{}: {}", ename, evalue), &traceback);
            }
            Err(e) => {
                report_failure(code, &e.to_string(), &[]);
                return FragmentResult::failed(fragment.sequence);
            }
        }

        let (outcomes, raised) = self.drain(&request).await;

        for mode in self.guard.modes_for(code) {
            let convergence = self.guard.await_condition(mode).await;
            tracing::debug!(?convergence, "Cluster {} wait finished", mode);
        }

        FragmentResult {
            outcomes,
            failed: failed || raised,
            sequence: fragment.sequence,
        }
    }

    /// Collect the telemetry burst for `request`.
    ///
    /// Returns the outcomes and whether an error event was seen.
    async fn drain(&mut self, request: &RequestId) -> (Vec<ExecutionOutcome>, bool) {
        let mut outcomes = Vec::new();
        let mut raised = false;

        loop {
            let message = match self.channels.poll_telemetry(self.telemetry_quiet).await {
                Ok(Telemetry::Message(message)) => message,
                Ok(Telemetry::Quiet) => break,
                Err(e) => {
                    tracing::warn!("Telemetry ended early: {}", e);
                    break;
                }
            };

            // Unattributed events belong to the in-flight request.
            if let Some(parent) = message.parent_id.as_deref() {
                if parent != request.as_str() {
                    tracing::debug!("Discarding telemetry for earlier request {}", parent);
                    continue;
                }
            }

            match message.kind {
                TelemetryKind::Status { .. } | TelemetryKind::ExecuteInput => {}
                TelemetryKind::ClearOutput { .. } => outcomes.clear(),
                TelemetryKind::Stream { name, text } => {
                    outcomes.push(ExecutionOutcome::Stream { name, text });
                }
                TelemetryKind::DisplayData { data, metadata } => {
                    outcomes.push(ExecutionOutcome::DisplayPayload {
                        metadata,
                        data,
                        execution_count: None,
                    });
                }
                TelemetryKind::ExecuteResult {
                    data,
                    metadata,
                    execution_count,
                } => {
                    outcomes.push(ExecutionOutcome::DisplayPayload {
                        metadata,
                        data,
                        execution_count,
                    });
                }
                TelemetryKind::Error {
                    ename,
                    evalue,
                    traceback,
                } => {
                    raised = true;
                    outcomes.push(ExecutionOutcome::Error {
                        name: ename,
                        message: evalue,
                        traceback,
                    });
                }
                TelemetryKind::Unknown { msg_type } => {
                    tracing::warn!("Unhandled telemetry message: {}", msg_type);
                }
                TelemetryKind::Malformed { msg_type, reason } => {
                    tracing::warn!("Malformed {} message: {}", msg_type, reason);
                }
            }
        }

        (outcomes, raised)
    }
}

/// Log a failed fragment with its source and traceback.
fn report_failure(code: &str, reason: &str, traceback: &[String]) {
    tracing::warn!(
        "FAILURE:\n{}\n-----\nraised: {}\n{}",
        code,
        reason,
        traceback.join("\n")
    );
}
