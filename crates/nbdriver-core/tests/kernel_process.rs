//! Integration tests for `run_notebook` against real child processes.
//!
//! Small Python scripts speak the line protocol in place of a real kernel.
//! Tests return early when no `python3` is installed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use nbdriver_core::{
    DocumentFragment, Error, ExecutionOutcome, ExecutorConfig, FragmentResult, KernelSpec,
    NotebookDocument, RunConfig, RunSummary, run_notebook,
};

// =============================================================================
// Test Helpers
// =============================================================================

/// Replies to every request; `print X` streams X, `raise N` raises N.
const ECHO_KERNEL: &str = r#"
import json, sys

def send(channel, msg_type, parent, content):
    sys.stdout.write(json.dumps({
        "channel": channel,
        "header": {"msg_id": parent + "-" + msg_type, "msg_type": msg_type},
        "parent_header": {"msg_id": parent},
        "content": content,
    }) + "\n")
    sys.stdout.flush()

count = 0
for line in sys.stdin:
    msg = json.loads(line)
    kind = msg["header"]["msg_type"]
    if kind == "shutdown_request":
        break
    if kind != "execute_request":
        continue
    parent = msg["header"]["msg_id"]
    code = msg["content"]["code"]
    count += 1
    if code.startswith("print "):
        send("iopub", "stream", parent, {"name": "stdout", "text": code[6:]})
        send("shell", "execute_reply", parent, {"status": "ok", "execution_count": count})
    elif code.startswith("raise "):
        err = {"ename": code[6:], "evalue": "boom", "traceback": []}
        send("iopub", "error", parent, err)
        send("shell", "execute_reply", parent, dict(err, status="error"))
    else:
        send("shell", "execute_reply", parent, {"status": "ok", "execution_count": count})
"#;

/// Never answers and only exits once its input is closed.
const SILENT_KERNEL: &str = r#"
import sys
for line in sys.stdin:
    pass
"#;

struct Slot {
    text: String,
    result: Option<FragmentResult>,
}

impl DocumentFragment for Slot {
    fn text(&self) -> &str {
        &self.text
    }

    fn record(&mut self, result: FragmentResult) {
        self.result = Some(result);
    }
}

struct Cells(Vec<Slot>);

impl Cells {
    fn new(texts: &[&str]) -> Self {
        Self(
            texts
                .iter()
                .map(|text| Slot {
                    text: text.to_string(),
                    result: None,
                })
                .collect(),
        )
    }
}

impl NotebookDocument for Cells {
    fn code_fragments(&mut self) -> Vec<&mut dyn DocumentFragment> {
        self.0
            .iter_mut()
            .map(|slot| slot as &mut dyn DocumentFragment)
            .collect()
    }
}

fn python() -> Option<PathBuf> {
    which::which("python3").ok()
}

fn script_config(python: PathBuf, script: &str, reply_timeout: Duration) -> RunConfig {
    RunConfig {
        kernel: KernelSpec {
            program: Some(python),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
        },
        executor: ExecutorConfig {
            reply_timeout,
            telemetry_quiet: Duration::from_millis(200),
        },
        ..Default::default()
    }
}

// =============================================================================
// run_notebook
// =============================================================================

#[tokio::test]
async fn test_outcomes_recorded_from_child_process() {
    let Some(python) = python() else {
        return;
    };
    let config = script_config(python, ECHO_KERNEL, Duration::from_secs(10));
    let mut cells = Cells::new(&["print a", "raise KeyError", "x = 1"]);

    let summary = run_notebook(&config, &mut cells, None).await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            executed: 3,
            failed: 1,
        }
    );

    let first = cells.0[0].result.as_ref().unwrap();
    assert_eq!(first.sequence, Some(1));
    assert!(!first.failed);
    assert_eq!(
        first.outcomes,
        vec![ExecutionOutcome::Stream {
            name: "stdout".to_string(),
            text: "a".to_string(),
        }]
    );

    let second = cells.0[1].result.as_ref().unwrap();
    assert!(second.failed);
    assert!(matches!(
        second.outcomes.as_slice(),
        [ExecutionOutcome::Error { name, .. }] if name == "KeyError"
    ));

    let third = cells.0[2].result.as_ref().unwrap();
    assert_eq!(third.sequence, Some(3));
    assert!(third.outcomes.is_empty());
}

#[tokio::test]
async fn test_unanswered_warm_up_is_fatal_and_kernel_is_released() {
    let Some(python) = python() else {
        return;
    };
    let config = script_config(python, SILENT_KERNEL, Duration::from_millis(500));
    let mut cells = Cells::new(&["x = 1"]);

    let started = Instant::now();
    let err = run_notebook(&config, &mut cells, None).await.unwrap_err();

    assert!(matches!(err, Error::KernelStartup(_)));
    assert!(cells.0[0].result.is_none());
    // Closing the kernel's input ends it well before the shutdown grace period.
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_missing_kernel_program_is_fatal() {
    let config = RunConfig {
        kernel: KernelSpec {
            program: Some(PathBuf::from("/nonexistent/kernel-program")),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut cells = Cells::new(&["x = 1"]);

    let err = run_notebook(&config, &mut cells, None).await.unwrap_err();

    assert!(matches!(err, Error::KernelStartup(_)));
    assert!(cells.0[0].result.is_none());
}

#[tokio::test]
async fn test_bundled_bridge_drives_jupyter_kernel() {
    let Some(python) = python() else {
        return;
    };
    let has_jupyter = std::process::Command::new(&python)
        .args(["-c", "import jupyter_client, ipykernel"])
        .status()
        .is_ok_and(|status| status.success());
    if !has_jupyter {
        return;
    }

    let config = RunConfig {
        executor: ExecutorConfig {
            reply_timeout: Duration::from_secs(60),
            telemetry_quiet: Duration::from_millis(500),
        },
        ..Default::default()
    };
    let mut cells = Cells::new(&["print('hi')", "1 / 0"]);

    let summary = run_notebook(&config, &mut cells, None).await.unwrap();

    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 1);
    let first = cells.0[0].result.as_ref().unwrap();
    assert!(first.outcomes.contains(&ExecutionOutcome::Stream {
        name: "stdout".to_string(),
        text: "hi\n".to_string(),
    }));
    assert!(cells.0[1].result.as_ref().unwrap().failed);
}
