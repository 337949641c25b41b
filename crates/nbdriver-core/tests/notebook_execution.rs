//! Integration tests for the run loop and cell executor.
//!
//! A scripted kernel stands in for a real interpreter: each code string maps
//! to a reply and a burst of telemetry events.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use nbdriver_core::{
    CellExecutor, ClusterGuard, ClusterGuardConfig, CodeFragment, DocumentFragment, Error,
    ExecutionOutcome, ExecutorConfig, FragmentResult, KernelChannels, MembershipService,
    NotebookDocument, NotebookRunner, ReplyStatus, RequestId, Result, Telemetry, TelemetryKind,
    TelemetryMessage,
};
use serde_json::{Map, Value, json};

// =============================================================================
// Test Helpers
// =============================================================================

/// What the kernel does for one code string.
#[derive(Clone)]
struct Script {
    /// `None` means the reply never arrives.
    reply: Option<ReplyStatus>,
    events: Vec<TelemetryKind>,
}

impl Script {
    fn ok(events: Vec<TelemetryKind>) -> Self {
        Self {
            reply: Some(ReplyStatus::Ok),
            events,
        }
    }
}

#[derive(Default)]
struct ScriptedKernel {
    scripts: HashMap<String, Script>,
    pending: VecDeque<TelemetryMessage>,
    reply: Option<ReplyStatus>,
    sent: Vec<String>,
    calls: usize,
}

impl ScriptedKernel {
    fn with(mut self, code: &str, script: Script) -> Self {
        self.scripts.insert(code.to_string(), script);
        self
    }
}

impl KernelChannels for ScriptedKernel {
    async fn send_code(&mut self, code: &str) -> Result<RequestId> {
        self.calls += 1;
        self.sent.push(code.to_string());
        let id = format!("req-{}", self.sent.len());

        let script = self
            .scripts
            .get(code)
            .cloned()
            .unwrap_or_else(|| Script::ok(Vec::new()));
        self.reply = script.reply;
        self.pending
            .extend(script.events.into_iter().map(|kind| TelemetryMessage {
                parent_id: Some(id.clone()),
                kind,
            }));

        Ok(RequestId::new(id))
    }

    async fn await_reply(&mut self, _request: &RequestId, timeout: Duration) -> Result<ReplyStatus> {
        self.calls += 1;
        self.reply.take().ok_or(Error::ReplyTimeout(timeout))
    }

    async fn poll_telemetry(&mut self, _timeout: Duration) -> Result<Telemetry> {
        self.calls += 1;
        Ok(self
            .pending
            .pop_front()
            .map(Telemetry::Message)
            .unwrap_or(Telemetry::Quiet))
    }
}

/// Membership service that always reports the same count.
struct FixedMembership {
    count: usize,
}

impl FixedMembership {
    fn new(count: usize) -> Self {
        Self { count }
    }
}

impl MembershipService for FixedMembership {
    async fn member_count(&self) -> Result<usize> {
        Ok(self.count)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TestCell {
    Code(CodeSlot),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct CodeSlot {
    text: String,
    result: Option<FragmentResult>,
}

impl DocumentFragment for CodeSlot {
    fn text(&self) -> &str {
        &self.text
    }

    fn record(&mut self, result: FragmentResult) {
        self.result = Some(result);
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TestDocument {
    cells: Vec<TestCell>,
}

impl TestDocument {
    fn new(cells: &[(&str, &str)]) -> Self {
        let cells = cells
            .iter()
            .map(|(kind, text)| match *kind {
                "code" => TestCell::Code(CodeSlot {
                    text: text.to_string(),
                    result: None,
                }),
                _ => TestCell::Text(text.to_string()),
            })
            .collect();
        Self { cells }
    }

    fn results(&self) -> Vec<&FragmentResult> {
        self.cells
            .iter()
            .filter_map(|cell| match cell {
                TestCell::Code(slot) => slot.result.as_ref(),
                TestCell::Text(_) => None,
            })
            .collect()
    }
}

impl NotebookDocument for TestDocument {
    fn code_fragments(&mut self) -> Vec<&mut dyn DocumentFragment> {
        self.cells
            .iter_mut()
            .filter_map(|cell| match cell {
                TestCell::Code(slot) => Some(slot as &mut dyn DocumentFragment),
                TestCell::Text(_) => None,
            })
            .collect()
    }
}

fn runner(
    kernel: ScriptedKernel,
    membership: FixedMembership,
) -> NotebookRunner<ScriptedKernel, FixedMembership> {
    let guard = ClusterGuard::new(membership, ClusterGuardConfig::default());
    NotebookRunner::new(CellExecutor::new(kernel, guard, &ExecutorConfig::default()))
}

fn stream(name: &str, text: &str) -> TelemetryKind {
    TelemetryKind::Stream {
        name: name.to_string(),
        text: text.to_string(),
    }
}

fn display(text: &str) -> TelemetryKind {
    TelemetryKind::DisplayData {
        data: mime_plain(text),
        metadata: Map::new(),
    }
}

fn mime_plain(text: &str) -> Map<String, Value> {
    json!({ "text/plain": text }).as_object().unwrap().clone()
}

// =============================================================================
// Run Loop
// =============================================================================

#[tokio::test]
async fn test_every_code_fragment_runs_in_order() {
    let kernel = ScriptedKernel::default()
        .with("a = 1", Script::ok(vec![stream("stdout", "a\n")]))
        .with(
            "raise ValueError()",
            Script {
                reply: Some(ReplyStatus::Error {
                    ename: "ValueError".to_string(),
                    evalue: String::new(),
                    traceback: Vec::new(),
                }),
                events: Vec::new(),
            },
        );
    let mut document = TestDocument::new(&[
        ("text", "# Intro"),
        ("code", "a = 1"),
        ("code", "raise ValueError()"),
        ("text", "more words"),
        ("code", "b = 2"),
    ]);
    let mut runner = runner(kernel, FixedMembership::new(0));

    let summary = runner.run(&mut document).await;

    assert_eq!(summary.executed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        runner.executor().channels().sent,
        vec!["a = 1", "raise ValueError()", "b = 2"]
    );

    let results = document.results();
    let sequences: Vec<_> = results.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![Some(1), Some(2), Some(3)]);
    let failures: Vec<_> = results.iter().map(|r| r.failed).collect();
    assert_eq!(failures, vec![false, true, false]);
}

#[tokio::test]
async fn test_text_fragments_are_untouched() {
    let original = TestDocument::new(&[
        ("text", "# Title"),
        ("code", "x = 1"),
        ("text", "## Solution\nthe answer"),
    ]);
    let mut document = original.clone();
    let mut runner = runner(ScriptedKernel::default(), FixedMembership::new(0));

    runner.run(&mut document).await;

    assert_eq!(document.cells[0], original.cells[0]);
    assert_eq!(document.cells[2], original.cells[2]);
}

#[tokio::test]
async fn test_reply_timeout_fails_fragment_and_run_continues() {
    let kernel = ScriptedKernel::default().with(
        "while True: pass",
        Script {
            reply: None,
            events: vec![stream("stdout", "late output\n")],
        },
    );
    let mut document = TestDocument::new(&[("code", "while True: pass"), ("code", "y = 2")]);
    let mut runner = runner(kernel, FixedMembership::new(0));

    let summary = runner.run(&mut document).await;

    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 1);

    let results = document.results();
    assert!(results[0].failed);
    assert!(results[0].outcomes.is_empty());
    // Late events from the timed-out request do not leak into the next one.
    assert!(!results[1].failed);
    assert!(results[1].outcomes.is_empty());
    assert_eq!(results[1].sequence, Some(2));
}

#[tokio::test]
async fn test_document_without_code_runs_nothing() {
    let mut document = TestDocument::new(&[("text", "only prose")]);
    let mut runner = runner(ScriptedKernel::default(), FixedMembership::new(0));

    let summary = runner.run(&mut document).await;

    assert_eq!(summary.executed, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(runner.executor().channels().calls, 0);
}

// =============================================================================
// Cell Executor
// =============================================================================

#[tokio::test]
async fn test_stream_then_error_is_failed() {
    let kernel = ScriptedKernel::default().with(
        "boom()",
        Script::ok(vec![
            TelemetryKind::Status {
                execution_state: "busy".to_string(),
            },
            TelemetryKind::ExecuteInput,
            stream("stdout", "hi"),
            TelemetryKind::Error {
                ename: "ValueError".to_string(),
                evalue: "bad".to_string(),
                traceback: vec!["tb1".to_string()],
            },
            TelemetryKind::Status {
                execution_state: "idle".to_string(),
            },
        ]),
    );
    let guard = ClusterGuard::new(FixedMembership::new(0), ClusterGuardConfig::default());
    let mut executor = CellExecutor::new(kernel, guard, &ExecutorConfig::default());

    let result = executor.execute(&CodeFragment::new("boom()")).await;

    assert!(result.failed);
    assert_eq!(
        result.outcomes,
        vec![
            ExecutionOutcome::Stream {
                name: "stdout".to_string(),
                text: "hi".to_string(),
            },
            ExecutionOutcome::Error {
                name: "ValueError".to_string(),
                message: "bad".to_string(),
                traceback: vec!["tb1".to_string()],
            },
        ]
    );
}

#[tokio::test]
async fn test_clear_output_discards_earlier_outcomes() {
    let kernel = ScriptedKernel::default().with(
        "progress()",
        Script::ok(vec![
            stream("stdout", "10%"),
            display("old"),
            TelemetryKind::ClearOutput { wait: false },
            display("done"),
            stream("stdout", "100%"),
        ]),
    );
    let guard = ClusterGuard::new(FixedMembership::new(0), ClusterGuardConfig::default());
    let mut executor = CellExecutor::new(kernel, guard, &ExecutorConfig::default());

    let result = executor.execute(&CodeFragment::new("progress()")).await;

    assert!(!result.failed);
    assert_eq!(
        result.outcomes,
        vec![
            ExecutionOutcome::DisplayPayload {
                metadata: Map::new(),
                data: mime_plain("done"),
                execution_count: None,
            },
            ExecutionOutcome::Stream {
                name: "stdout".to_string(),
                text: "100%".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_empty_fragment_never_touches_kernel() {
    let guard = ClusterGuard::new(FixedMembership::new(0), ClusterGuardConfig::default());
    let mut executor = CellExecutor::new(
        ScriptedKernel::default(),
        guard,
        &ExecutorConfig::default(),
    );

    let result = executor
        .execute(&CodeFragment::new("").with_sequence(1))
        .await;

    assert_eq!(result, FragmentResult::empty(Some(1)));
    assert_eq!(executor.channels().calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cluster_stop_waits_for_empty_membership() {
    let kernel = ScriptedKernel::default();
    let config = ClusterGuardConfig {
        max_attempts: 3,
        ..Default::default()
    };
    let guard = ClusterGuard::new(FixedMembership::new(2), config);
    let mut executor = CellExecutor::new(kernel, guard, &ExecutorConfig::default());

    let started = tokio::time::Instant::now();
    let result = executor
        .execute(&CodeFragment::new("!ipcluster stop"))
        .await;

    // The cluster never empties: the guard gives up without failing the fragment.
    assert!(!result.failed);
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}
