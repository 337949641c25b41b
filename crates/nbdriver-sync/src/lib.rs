//! Notebook documents for nbdriver.
//!
//! Reads and writes `.ipynb` files, scrubs them for distribution and maps the
//! data files they exchange.
//!
//! # Architecture
//!
//! ```text
//! notebook.ipynb ─────► JupyterNotebook ─────► NotebookRunner (nbdriver-core)
//!                             │
//!                             ├──► redact  ─────► notebook-work.ipynb
//!                             │
//!                             └──► dataflow ────► Workflow ─────► dot -Tpdf
//! ```

mod error;
pub mod dataflow;
pub mod ipynb;
pub mod redact;
pub mod upgrade;

pub use dataflow::{FileNames, Workflow, build_workflow, find_filenames};
pub use error::{SyncError, SyncResult};
pub use ipynb::{Cell, CellOutput, CodeCell, JupyterNotebook, MultilineString, TextCell};
pub use redact::{Scrubbed, remove_outputs, remove_solution_code, remove_solution_text};

use std::path::{Path, PathBuf};

/// Path of the `<stem>-<action>.ipynb` file written for `target` in `outdir`.
pub fn derived_path(target: impl AsRef<Path>, outdir: impl AsRef<Path>, action: &str) -> PathBuf {
    let stem = target
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    outdir.as_ref().join(format!("{}-{}.ipynb", stem, action))
}
