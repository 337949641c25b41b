//! Data-flow graphs between notebooks and the files they read and write.
//!
//! Filenames are found with a textual heuristic: on each line of an executed
//! code cell that mentions a reader or writer keyword, the text inside the
//! first pair of single quotes after the last keyword occurrence is taken as
//! a filename. Anything cleverer would need to parse the cell's language.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::{SyncError, SyncResult};
use crate::ipynb::JupyterNotebook;

/// Calls that read a data file.
pub const READER_KEYWORDS: &[&str] = &["read_csv"];

/// Calls that write a data file.
pub const WRITER_KEYWORDS: &[&str] = &["to_csv", "savefig"];

/// Files a notebook reads and writes, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNames {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Extract filenames from lines of `code` that mention any of `keywords`.
pub fn extract_filenames(code: &str, keywords: &[&str]) -> Vec<String> {
    let mut names = Vec::new();
    for keyword in keywords {
        let pattern = match Regex::new(&format!("(.*){}(.*)", regex::escape(keyword))) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!("Bad filename pattern for {}: {}", keyword, e);
                continue;
            }
        };
        for captures in pattern.captures_iter(code) {
            let rest = captures.get(2).map_or("", |m| m.as_str());
            match rest.split('\'').nth(1) {
                Some(name) => names.push(name.to_string()),
                None => tracing::debug!("No quoted filename after {} in {:?}", keyword, rest),
            }
        }
    }
    names
}

/// Collect the files read and written by the executed code cells.
pub fn find_filenames(notebook: &JupyterNotebook) -> FileNames {
    let mut files = FileNames::default();
    for cell in notebook.code_cells() {
        if cell.execution_count.is_none() {
            continue;
        }
        let code = cell.source.as_str();
        files.inputs.extend(extract_filenames(code, READER_KEYWORDS));
        files.outputs.extend(extract_filenames(code, WRITER_KEYWORDS));
    }
    files
}

/// A node in the data-flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowNode {
    Notebook(String),
    File(String),
}

impl FlowNode {
    pub fn name(&self) -> &str {
        match self {
            FlowNode::Notebook(name) | FlowNode::File(name) => name,
        }
    }

    /// Graphviz attributes for this node.
    fn attributes(&self) -> String {
        match self {
            FlowNode::Notebook(_) => "shape=box3d".to_string(),
            FlowNode::File(name) => format!(
                "shape=octagon style=filled fillcolor={}",
                file_colour(name)
            ),
        }
    }
}

impl fmt::Display for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a data-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// File → notebook
    Read,
    /// Notebook → file
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Fill colour for a data file, by extension.
pub fn file_colour(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some("csv") => "palegreen",
        Some("pdf") => "lightblue",
        Some("pickle") => "yellow",
        _ => "white",
    }
}

/// Graph of notebooks and the files flowing between them.
pub struct Workflow {
    /// Edges go from producer to consumer
    graph: DiGraph<FlowNode, Access>,
    /// Notebook name to node index mapping
    notebooks: FxHashMap<String, NodeIndex>,
    /// File name to node index mapping
    files: FxHashMap<String, NodeIndex>,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            notebooks: FxHashMap::default(),
            files: FxHashMap::default(),
        }
    }

    /// Add a notebook with the files it reads and writes.
    pub fn add_notebook(&mut self, name: &str, files: &FileNames) {
        let notebook = match self.notebooks.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = self.graph.add_node(FlowNode::Notebook(name.to_string()));
                self.notebooks.insert(name.to_string(), idx);
                idx
            }
        };

        for input in &files.inputs {
            let file = self.file_node(input);
            self.graph.update_edge(file, notebook, Access::Read);
        }
        for output in &files.outputs {
            let file = self.file_node(output);
            self.graph.update_edge(notebook, file, Access::Write);
        }
    }

    fn file_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.files.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(FlowNode::File(name.to_string()));
        self.files.insert(name.to_string(), idx);
        idx
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DiGraph<FlowNode, Access> {
        &self.graph
    }

    pub fn notebook_count(&self) -> usize {
        self.notebooks.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Graphviz DOT description of the graph.
    pub fn to_dot(&self) -> String {
        type Graph = DiGraph<FlowNode, Access>;
        let edge_attributes = |_: &Graph, _: EdgeReference<'_, Access>| String::new();
        let node_attributes = |_: &Graph, (_, node): (NodeIndex, &FlowNode)| node.attributes();
        let config = [Config::EdgeNoLabel];
        let dot = Dot::with_attr_getters(
            &self.graph,
            &config,
            &edge_attributes,
            &node_attributes,
        );
        format!("{}", dot)
    }

    /// Write the graph to `output`.
    ///
    /// A `.dot` path receives the DOT text. Any other extension names the
    /// Graphviz output format and the graph is rendered by `dot`.
    pub fn render(&self, output: &Path) -> SyncResult<()> {
        let format = output
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                SyncError::RenderError(format!(
                    "cannot infer an output format from {}",
                    output.display()
                ))
            })?;

        if format == "dot" {
            return fs::write(output, self.to_dot()).map_err(|e| SyncError::WriteError {
                path: output.to_path_buf(),
                message: e.to_string(),
            });
        }

        let program = which::which("dot").map_err(|_| {
            SyncError::RenderError("Graphviz `dot` was not found on PATH".to_string())
        })?;
        tracing::debug!("Rendering {} with {}", output.display(), program.display());

        let mut child = Command::new(program)
            .arg(format!("-T{}", format))
            .arg("-o")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(self.to_dot().as_bytes())?;
        }

        let result = child.wait_with_output()?;
        if !result.status.success() {
            return Err(SyncError::RenderError(format!(
                "dot exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the workflow for notebooks `names` found in `dir`.
pub fn build_workflow(dir: &Path, names: &[String]) -> SyncResult<Workflow> {
    let mut workflow = Workflow::new();
    for name in names {
        let notebook = JupyterNotebook::read_from_file(dir.join(name))?;
        let files = find_filenames(&notebook);
        tracing::debug!(
            "{}: reads {:?}, writes {:?}",
            name,
            files.inputs,
            files.outputs
        );
        workflow.add_notebook(name, &files);
    }
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipynb::{Cell, CodeCell, TextCell};

    #[test]
    fn test_extract_reader() {
        let code = "import pandas as pd\ndf = pd.read_csv('data/raw.csv')\nprint(df)";
        assert_eq!(extract_filenames(code, READER_KEYWORDS), vec!["data/raw.csv"]);
    }

    #[test]
    fn test_extract_writers_by_keyword_order() {
        let code = "plt.savefig('plot.pdf')\ndf.to_csv('clean.csv')\n";
        assert_eq!(
            extract_filenames(code, WRITER_KEYWORDS),
            vec!["clean.csv", "plot.pdf"]
        );
    }

    #[test]
    fn test_extract_uses_last_keyword_on_line() {
        let code = "a.to_csv('first.csv'); b.to_csv('second.csv')";
        assert_eq!(extract_filenames(code, WRITER_KEYWORDS), vec!["second.csv"]);
    }

    #[test]
    fn test_extract_skips_unquoted() {
        let code = "df = pd.read_csv(path)\ndf2 = pd.read_csv(\"double.csv\")";
        assert!(extract_filenames(code, READER_KEYWORDS).is_empty());
    }

    #[test]
    fn test_find_filenames_ignores_unexecuted_cells() {
        let mut executed = CodeCell::new("df = pd.read_csv('in.csv')\ndf.to_csv('out.csv')");
        executed.execution_count = Some(1);

        let mut notebook = JupyterNotebook::new();
        notebook.cells = vec![
            Cell::Markdown(TextCell::new("pd.read_csv('doc.csv')")),
            Cell::Code(executed),
            Cell::Code(CodeCell::new("pd.read_csv('never.csv')")),
        ];

        let files = find_filenames(&notebook);

        assert_eq!(files.inputs, vec!["in.csv"]);
        assert_eq!(files.outputs, vec!["out.csv"]);
    }

    #[test]
    fn test_file_colours() {
        assert_eq!(file_colour("a.csv"), "palegreen");
        assert_eq!(file_colour("dir/b.pdf"), "lightblue");
        assert_eq!(file_colour("model.pickle"), "yellow");
        assert_eq!(file_colour("notes.txt"), "white");
        assert_eq!(file_colour("README"), "white");
    }

    #[test]
    fn test_workflow_shares_file_nodes() {
        let mut workflow = Workflow::new();
        workflow.add_notebook(
            "toyA.ipynb",
            &FileNames {
                inputs: vec!["raw.csv".to_string()],
                outputs: vec!["clean.csv".to_string()],
            },
        );
        workflow.add_notebook(
            "toyB.ipynb",
            &FileNames {
                inputs: vec!["clean.csv".to_string(), "clean.csv".to_string()],
                outputs: vec!["plot.pdf".to_string()],
            },
        );

        assert_eq!(workflow.notebook_count(), 2);
        assert_eq!(workflow.file_count(), 3);
        assert_eq!(workflow.graph().edge_count(), 4);
    }

    #[test]
    fn test_dot_output() {
        let mut workflow = Workflow::new();
        workflow.add_notebook(
            "toyA.ipynb",
            &FileNames {
                inputs: vec!["raw.csv".to_string()],
                outputs: vec!["model.pickle".to_string()],
            },
        );

        let dot = workflow.to_dot();

        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("toyA.ipynb"));
        assert!(dot.contains("shape=box3d"));
        assert!(dot.contains("fillcolor=palegreen"));
        assert!(dot.contains("fillcolor=yellow"));
        assert_eq!(dot.matches("->").count(), 2);
    }

    #[test]
    fn test_render_without_extension_fails() {
        let workflow = Workflow::new();
        let err = workflow.render(Path::new("graph")).unwrap_err();
        assert!(matches!(err, SyncError::RenderError(_)));
    }
}
