//! Error types for nbdriver-core.

use std::time::Duration;

use thiserror::Error;

/// Result type for nbdriver-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nbdriver-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The kernel program could not be located or spawned.
    #[error("kernel startup failed: {0}")]
    KernelStartup(String),

    /// The kernel closed its output stream.
    #[error("kernel exited unexpectedly")]
    KernelExited,

    /// No reply for the in-flight request arrived within the bound.
    #[error("no reply from kernel within {0:?}")]
    ReplyTimeout(Duration),

    /// Transport failure while talking to the kernel.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// A message did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The membership service could not be queried.
    #[error("membership service unreachable: {0}")]
    Membership(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns a short recovery hint for errors the operator can act on.
    pub fn with_hint(&self) -> String {
        match self {
            Error::KernelStartup(_) => format!(
                "{self}\n  hint: pass --kernel <path>, set NBDRIVER_KERNEL_PATH, \
                 or install jupyter_client and ipykernel for the bundled bridge"
            ),
            Error::KernelExited => {
                format!("{self}\n  hint: run the kernel program by hand to see its stderr")
            }
            _ => self.to_string(),
        }
    }
}
