//! Error types for notebook documents.

use std::path::PathBuf;

/// Result type for document operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while reading, writing or rendering documents.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Failed to read a notebook file.
    #[error("Failed to read file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    /// Failed to write an output file.
    #[error("Failed to write file {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// Failed to serialize/deserialize JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid notebook structure.
    #[error("Invalid notebook: {0}")]
    InvalidNotebook(String),

    /// Graph rendering failed.
    #[error("Render error: {0}")]
    RenderError(String),
}
