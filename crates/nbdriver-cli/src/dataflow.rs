//! `dataflow` command: graph the files a set of notebooks exchange.

use std::path::Path;

use nbdriver_sync::build_workflow;

use crate::colors;

/// Build the workflow for `targets` in `directory` and render it to `output`.
pub fn execute(targets: &[String], directory: &Path, output: &Path) -> anyhow::Result<()> {
    if targets.is_empty() {
        println!("{}", colors::paint(colors::YELLOW, "---- Nothing to do ----"));
        println!("Pass one or more notebook names, e.g. nbdriver dataflow a.ipynb b.ipynb");
        return Ok(());
    }

    let workflow = build_workflow(directory, targets)?;
    workflow.render(output)?;

    println!(
        "{} {} ({} notebooks, {} files)",
        colors::paint(colors::GREEN, "Wrote"),
        output.display(),
        workflow.notebook_count(),
        workflow.file_count()
    );
    Ok(())
}
