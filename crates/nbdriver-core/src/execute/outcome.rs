//! Values produced by executing fragments.

use std::fmt;

use serde_json::{Map, Value};

/// A code fragment handed to the executor.
#[derive(Debug, Clone, Copy)]
pub struct CodeFragment<'a> {
    /// Source text.
    pub text: &'a str,
    /// Sequence number assigned by the run loop.
    pub sequence: Option<u32>,
}

impl<'a> CodeFragment<'a> {
    /// Create a fragment without a sequence number.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            sequence: None,
        }
    }

    /// Attach a sequence number.
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Whether there is anything to send to the kernel.
    pub fn is_executable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// One output of a fragment, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Text written to a named stream.
    Stream { name: String, text: String },
    /// Rich display payload keyed by MIME type.
    DisplayPayload {
        metadata: Map<String, Value>,
        data: Map<String, Value>,
        /// Set for the fragment's result value.
        execution_count: Option<u32>,
    },
    /// An exception raised by the fragment.
    Error {
        name: String,
        message: String,
        traceback: Vec<String>,
    },
}

/// Result of executing one fragment. Built once, never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentResult {
    /// Outputs in arrival order.
    pub outcomes: Vec<ExecutionOutcome>,
    /// Whether the fragment failed.
    pub failed: bool,
    /// Sequence number assigned by the run loop.
    pub sequence: Option<u32>,
}

impl FragmentResult {
    /// A result with no outputs.
    pub fn empty(sequence: Option<u32>) -> Self {
        Self {
            outcomes: Vec::new(),
            failed: false,
            sequence,
        }
    }

    /// A failed result with no outputs.
    pub fn failed(sequence: Option<u32>) -> Self {
        Self {
            outcomes: Vec::new(),
            failed: true,
            sequence,
        }
    }
}

/// Counters for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Code fragments executed.
    pub executed: usize,
    /// Code fragments that failed.
    pub failed: usize,
}

impl RunSummary {
    pub(crate) fn record(&mut self, result: &FragmentResult) {
        self.executed += 1;
        if result.failed {
            self.failed += 1;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    ran {:3} cells", self.executed)?;
        if self.failed > 0 {
            write!(f, "\n    {:3} cells raised exceptions", self.failed)?;
        }
        Ok(())
    }
}
