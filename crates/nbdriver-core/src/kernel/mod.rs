//! Communication with kernel processes.
//!
//! This module provides the wire protocol, the channel contract the executor
//! relies on, and the process handle that implements it.

mod channels;
mod connection;
mod process;
pub mod protocol;

pub use channels::{KernelChannels, Telemetry};
pub use connection::KernelConnection;
pub use process::KernelProcess;
pub use protocol::{ReplyStatus, RequestId, TelemetryKind, TelemetryMessage, WireMessage};
