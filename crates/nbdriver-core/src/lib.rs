//! Kernel execution driver for nbdriver.
//!
//! This crate provides:
//! - The kernel wire protocol and stdio channel client
//! - Single-fragment execution with bounded waits
//! - Cluster start/stop synchronisation
//! - The notebook run loop

pub mod config;
pub mod error;
pub mod execute;
pub mod kernel;

pub use config::{ClusterGuardConfig, ExecutorConfig, KernelSpec, MembershipCommand, RunConfig};
pub use error::{Error, Result};
pub use execute::{
    CellExecutor, ClusterGuard, ClusterMode, CodeFragment, CommandMembership, Convergence,
    DocumentFragment, ExecutionOutcome, FragmentResult, MembershipService, NotebookDocument,
    NotebookRunner, RunCallback, RunSummary, run_notebook,
};
pub use kernel::{
    KernelChannels, KernelConnection, KernelProcess, ReplyStatus, RequestId, Telemetry,
    TelemetryKind, TelemetryMessage,
};
