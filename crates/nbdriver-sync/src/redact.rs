//! Output removal and solution scrubbing.
//!
//! A solution cell is one whose text opens with a `solution` heading. Work
//! versions of a notebook replace those cells with placeholders.

use std::fmt;

use crate::ipynb::{Cell, JupyterNotebook, MultilineString};

/// Headings that mark a solution cell (compared lowercased).
pub const SOLUTION_MARKERS: [&str; 4] = ["# solution", "## solution", "### solution", "#### solution"];

/// Only this many leading characters are inspected for a marker.
const MARKER_WINDOW: usize = 30;

/// Replacement text for solution markdown cells.
pub const SOLUTION_PLACEHOLDER_MARKDOWN: &str = "### <span style=\"color:blue\">Answer</span>\n<i>--- replace this with your solution, add and remove code and markdown cells as appropriate ---</i>";

/// Replacement text for solution code cells.
pub const SOLUTION_PLACEHOLDER_CODE: &str =
    "# replace this with your solution, add and remove code and markdown cells as appropriate";

/// How many cells of a kind an operation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scrubbed {
    pub scrubbed: usize,
    pub total: usize,
}

impl fmt::Display for Scrubbed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scrubbed, self.total)
    }
}

/// Whether `source` starts with a solution marker.
pub fn is_solution_source(source: &str) -> bool {
    let start: String = source.to_lowercase().chars().take(MARKER_WINDOW).collect();
    SOLUTION_MARKERS
        .iter()
        .any(|marker| start.starts_with(marker))
}

/// Clear outputs and execution counts of every code cell.
pub fn remove_outputs(notebook: &mut JupyterNotebook) -> Scrubbed {
    let mut count = Scrubbed::default();
    for cell in &mut notebook.cells {
        if let Cell::Code(code) = cell {
            code.clear_outputs();
            count.scrubbed += 1;
            count.total += 1;
        }
    }
    tracing::debug!("Removed outputs of {} code cells", count.scrubbed);
    count
}

/// Replace solution code cells with the code placeholder.
pub fn remove_solution_code(notebook: &mut JupyterNotebook) -> Scrubbed {
    let mut count = Scrubbed::default();
    for cell in &mut notebook.cells {
        let Cell::Code(code) = cell else { continue };
        count.total += 1;
        if is_solution_source(code.source.as_str()) {
            code.source = MultilineString::from(SOLUTION_PLACEHOLDER_CODE);
            code.outputs.clear();
            count.scrubbed += 1;
        }
    }
    tracing::debug!("Scrubbed {} code cells", count);
    count
}

/// Replace solution markdown cells with the markdown placeholder.
pub fn remove_solution_text(notebook: &mut JupyterNotebook) -> Scrubbed {
    let mut count = Scrubbed::default();
    for cell in &mut notebook.cells {
        let Cell::Markdown(text) = cell else { continue };
        count.total += 1;
        if is_solution_source(text.source.as_str()) {
            text.source = MultilineString::from(SOLUTION_PLACEHOLDER_MARKDOWN);
            count.scrubbed += 1;
        }
    }
    tracing::debug!("Scrubbed {} markdown cells", count);
    count
}
