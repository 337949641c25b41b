//! Running every code fragment of a document in order.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::kernel::{KernelChannels, KernelProcess};

use super::cell::CellExecutor;
use super::cluster::{ClusterGuard, CommandMembership, MembershipService};
use super::context::RunCallback;
use super::outcome::{CodeFragment, FragmentResult, RunSummary};

/// Fragment used to check that a fresh kernel answers.
const WARM_UP_CODE: &str = "pass";

/// A code fragment inside a document, as seen by the run loop.
pub trait DocumentFragment {
    /// Source text.
    fn text(&self) -> &str;

    /// Store the fragment's result, replacing any earlier one.
    fn record(&mut self, result: FragmentResult);
}

/// A document whose code fragments can be run.
pub trait NotebookDocument {
    /// Code fragments in document order. Other fragments are not included.
    fn code_fragments(&mut self) -> Vec<&mut dyn DocumentFragment>;
}

/// Drives a [`CellExecutor`] over a whole document.
pub struct NotebookRunner<C, M> {
    executor: CellExecutor<C, M>,
    callback: Option<Box<dyn RunCallback>>,
}

impl<C: KernelChannels, M: MembershipService> NotebookRunner<C, M> {
    /// Create a runner.
    pub fn new(executor: CellExecutor<C, M>) -> Self {
        Self {
            executor,
            callback: None,
        }
    }

    /// Set the progress callback.
    pub fn set_callback(&mut self, callback: Box<dyn RunCallback>) {
        self.callback = Some(callback);
    }

    /// Borrow the executor.
    pub fn executor(&self) -> &CellExecutor<C, M> {
        &self.executor
    }

    /// Run every code fragment of `document`.
    ///
    /// The Nth code fragment gets sequence number N whether or not it fails.
    /// Failures never stop the run.
    pub async fn run<D>(&mut self, document: &mut D) -> RunSummary
    where
        D: NotebookDocument + ?Sized,
    {
        let mut summary = RunSummary::default();

        for slot in document.code_fragments() {
            let sequence = summary.executed as u32 + 1;
            if let Some(callback) = &self.callback {
                callback.on_fragment_started(sequence);
            }

            let result = {
                let fragment = CodeFragment::new(slot.text()).with_sequence(sequence);
                self.executor.execute(&fragment).await
            };

            summary.record(&result);
            tracing::debug!(sequence, failed = result.failed, "Fragment finished");
            if let Some(callback) = &self.callback {
                callback.on_fragment_finished(sequence, &result);
            }

            slot.record(result);
        }

        tracing::info!("ran {} fragments", summary.executed);
        if summary.failed > 0 {
            tracing::info!("{} fragments raised exceptions", summary.failed);
        }
        if let Some(callback) = &self.callback {
            callback.on_run_finished(&summary);
        }

        summary
    }
}

/// Start a kernel, run `document` against it and shut the kernel down.
///
/// Kernel startup failures are returned; fragment failures are not.
pub async fn run_notebook<D>(
    config: &RunConfig,
    document: &mut D,
    callback: Option<Box<dyn RunCallback>>,
) -> Result<RunSummary>
where
    D: NotebookDocument + ?Sized,
{
    let mut kernel = KernelProcess::start(&config.kernel).await?;

    let outcome = drive(&mut kernel, config, document, callback).await;

    if let Err(e) = kernel.shutdown().await {
        tracing::warn!("Kernel shutdown failed: {}", e);
    }

    outcome
}

async fn drive<D>(
    kernel: &mut KernelProcess,
    config: &RunConfig,
    document: &mut D,
    callback: Option<Box<dyn RunCallback>>,
) -> Result<RunSummary>
where
    D: NotebookDocument + ?Sized,
{
    warm_up(kernel, config).await?;

    let guard = ClusterGuard::new(
        CommandMembership::new(config.membership.clone()),
        config.cluster.clone(),
    );
    let executor = CellExecutor::new(kernel, guard, &config.executor);

    let mut runner = NotebookRunner::new(executor);
    if let Some(callback) = callback {
        runner.set_callback(callback);
    }

    Ok(runner.run(document).await)
}

/// Check that the kernel answers before running real fragments.
async fn warm_up<C: KernelChannels>(kernel: &mut C, config: &RunConfig) -> Result<()> {
    let request = kernel.send_code(WARM_UP_CODE).await?;
    kernel
        .await_reply(&request, config.executor.reply_timeout)
        .await
        .map_err(|e| Error::KernelStartup(format!("kernel did not answer: {}", e)))?;
    Ok(())
}
