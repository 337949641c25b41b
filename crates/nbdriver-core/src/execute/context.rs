//! Progress reporting for notebook runs.

use super::outcome::{FragmentResult, RunSummary};

/// Callback trait for run progress reporting.
pub trait RunCallback: Send + Sync {
    /// Called before a code fragment is sent to the kernel.
    fn on_fragment_started(&self, _sequence: u32) {}

    /// Called once a fragment's result is known.
    fn on_fragment_finished(&self, sequence: u32, result: &FragmentResult);

    /// Called after the last fragment.
    fn on_run_finished(&self, _summary: &RunSummary) {}
}
