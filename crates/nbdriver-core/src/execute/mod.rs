//! Execution engine for nbdriver.
//!
//! # Architecture
//!
//! ```text
//! NotebookRunner (one document, fragments strictly in order)
//!     │
//!     └── CellExecutor (one fragment)
//!             │
//!             ├── KernelChannels::send_code
//!             ├── KernelChannels::await_reply      (bounded by reply timeout)
//!             ├── KernelChannels::poll_telemetry   (until a quiet period)
//!             │
//!             └── ClusterGuard (only for cluster start/stop fragments)
//!                     └── MembershipService::member_count
//! ```
//!
//! # Module Structure
//!
//! - `cell` - CellExecutor for a single fragment
//! - `cluster` - ClusterGuard and membership services
//! - `context` - Progress callbacks
//! - `outcome` - Fragment results and run summaries
//! - `runner` - NotebookRunner and the document seam

mod cell;
mod cluster;
mod context;
mod outcome;
mod runner;

pub use cell::CellExecutor;
pub use cluster::{ClusterGuard, ClusterMode, CommandMembership, Convergence, MembershipService};
pub use context::RunCallback;
pub use outcome::{CodeFragment, ExecutionOutcome, FragmentResult, RunSummary};
pub use runner::{DocumentFragment, NotebookDocument, NotebookRunner, run_notebook};
