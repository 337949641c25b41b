//! Jupyter notebook (.ipynb) documents.
//!
//! Reads nbformat v3 and v4 JSON and writes v4. Fields this crate does not model are
//! kept in `extra` maps so a read/write cycle does not lose them.

use std::fmt;
use std::fs;
use std::path::Path;

use nbdriver_core::{DocumentFragment, ExecutionOutcome, FragmentResult, NotebookDocument};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::upgrade::upgrade_v3;

/// Major format version this crate understands.
pub const NBFORMAT: u32 = 4;

/// A Jupyter notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JupyterNotebook {
    /// Notebook cells, in document order
    pub cells: Vec<Cell>,

    /// Notebook metadata (kernelspec, language_info, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Format version (always 4)
    pub nbformat: u32,

    /// Minor format version
    pub nbformat_minor: u32,

    /// Top-level fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A notebook cell, tagged by `cell_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Code(CodeCell),
    Markdown(TextCell),
    Raw(TextCell),
}

/// A code cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeCell {
    /// Sequence number of the last execution, `null` when never run
    #[serde(default)]
    pub execution_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub outputs: Vec<CellOutput>,

    pub source: MultilineString,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Whether the last execution failed. Not part of the file format.
    #[serde(skip)]
    pub failed: bool,
}

/// A markdown or raw cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    pub source: MultilineString,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum CellOutput {
    /// Standard output/error
    Stream { name: String, text: MultilineString },

    /// Display data
    DisplayData {
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Value of the last expression
    ExecuteResult {
        execution_count: Option<u32>,
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Error output
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Text stored either as one string or as a list of lines.
///
/// Always written as a list of lines, each keeping its trailing newline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultilineString(pub String);

impl MultilineString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MultilineString {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for MultilineString {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for MultilineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for MultilineString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let lines: Vec<&str> = self.0.split_inclusive('\n').collect();
        let mut seq = serializer.serialize_seq(Some(lines.len()))?;
        for line in lines {
            seq.serialize_element(line)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for MultilineString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Single(String),
            Lines(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Single(text) => Self(text),
            Repr::Lines(lines) => Self(lines.concat()),
        })
    }
}

impl JupyterNotebook {
    /// Create a new empty notebook.
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            metadata: Map::new(),
            nbformat: NBFORMAT,
            nbformat_minor: 5,
            extra: Map::new(),
        }
    }

    /// Parse a notebook from JSON text.
    ///
    /// nbformat 3 documents are upgraded to version 4.
    pub fn from_json(content: &str) -> SyncResult<Self> {
        let mut raw: Map<String, Value> = serde_json::from_str(content)?;
        match raw.get("nbformat").and_then(Value::as_u64) {
            Some(3) => raw = upgrade_v3(raw)?,
            Some(4) => {}
            other => {
                return Err(SyncError::InvalidNotebook(format!(
                    "unsupported nbformat {:?}, expected 3 or {}",
                    other, NBFORMAT
                )));
            }
        }
        Ok(serde_json::from_value(Value::Object(raw))?)
    }

    /// Serialize with one-space indentation and a trailing newline.
    pub fn to_json(&self) -> SyncResult<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|e| SyncError::InvalidNotebook(e.to_string()))
    }

    /// Write the notebook to a file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| SyncError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Read a notebook from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SyncError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Code cells in document order.
    pub fn code_cells(&self) -> impl Iterator<Item = &CodeCell> {
        self.cells.iter().filter_map(|cell| match cell {
            Cell::Code(code) => Some(code),
            _ => None,
        })
    }
}

impl Default for JupyterNotebook {
    fn default() -> Self {
        Self::new()
    }
}

impl Cell {
    /// Source text of any cell kind.
    pub fn source(&self) -> &str {
        match self {
            Cell::Code(cell) => cell.source.as_str(),
            Cell::Markdown(cell) | Cell::Raw(cell) => cell.source.as_str(),
        }
    }
}

impl CodeCell {
    /// Create an unexecuted code cell.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: MultilineString(source.into()),
            ..Default::default()
        }
    }

    /// Drop outputs and the execution count.
    pub fn clear_outputs(&mut self) {
        self.outputs.clear();
        self.execution_count = None;
    }
}

impl TextCell {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: MultilineString(source.into()),
            ..Default::default()
        }
    }
}

impl From<ExecutionOutcome> for CellOutput {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Stream { name, text } => CellOutput::Stream {
                name,
                text: text.into(),
            },
            ExecutionOutcome::DisplayPayload {
                metadata,
                data,
                execution_count: Some(count),
            } => CellOutput::ExecuteResult {
                execution_count: Some(count),
                data,
                metadata,
            },
            ExecutionOutcome::DisplayPayload {
                metadata,
                data,
                execution_count: None,
            } => CellOutput::DisplayData { data, metadata },
            ExecutionOutcome::Error {
                name,
                message,
                traceback,
            } => CellOutput::Error {
                ename: name,
                evalue: message,
                traceback,
            },
        }
    }
}

impl DocumentFragment for CodeCell {
    fn text(&self) -> &str {
        self.source.as_str()
    }

    fn record(&mut self, result: FragmentResult) {
        let sequence = result.sequence;
        self.outputs = result
            .outcomes
            .into_iter()
            .map(CellOutput::from)
            .map(|mut output| {
                if let CellOutput::ExecuteResult {
                    execution_count, ..
                } = &mut output
                {
                    if sequence.is_some() {
                        *execution_count = sequence;
                    }
                }
                output
            })
            .collect();
        self.execution_count = sequence;
        self.failed = result.failed;
    }
}

impl NotebookDocument for JupyterNotebook {
    fn code_fragments(&mut self) -> Vec<&mut dyn DocumentFragment> {
        self.cells
            .iter_mut()
            .filter_map(|cell| match cell {
                Cell::Code(code) => Some(code as &mut dyn DocumentFragment),
                _ => None,
            })
            .collect()
    }
}
