//! Notebook processing commands: `work`, `sol`, `check` and `clean`.

use std::path::Path;
use std::time::Instant;

use nbdriver_core::{FragmentResult, RunCallback, RunSummary, run_notebook};
use nbdriver_sync::{
    JupyterNotebook, derived_path, remove_outputs, remove_solution_code, remove_solution_text,
};

use crate::KernelArgs;
use crate::colors;

/// What to do with a notebook after running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Strip outputs and solutions.
    Work,
    /// Keep outputs.
    Sol,
    /// Keep outputs; the run itself is the point.
    Check,
}

impl Action {
    /// Suffix used in the output file name.
    pub fn name(self) -> &'static str {
        match self {
            Action::Work => "work",
            Action::Sol => "sol",
            Action::Check => "check",
        }
    }
}

/// Progress callback printing one marker per executed cell.
pub struct ProgressCallback;

impl RunCallback for ProgressCallback {
    fn on_fragment_finished(&self, _sequence: u32, result: &FragmentResult) {
        if result.failed {
            print!("{}", colors::paint(colors::RED, "F"));
        } else {
            print!(".");
        }
        colors::flush_stdout();
    }

    fn on_run_finished(&self, summary: &RunSummary) {
        println!();
        println!("{}", summary);
    }
}

/// Run `target` and write `<outdir>/<stem>-<action>.ipynb`.
pub async fn execute(
    action: Action,
    target: &Path,
    outdir: &Path,
    opts: &KernelArgs,
) -> anyhow::Result<()> {
    let start = Instant::now();

    if !target.is_file() {
        anyhow::bail!("Notebook not found: {}", target.display());
    }
    if !outdir.is_dir() {
        anyhow::bail!("Output directory {} does not exist", outdir.display());
    }

    let target = target.canonicalize()?;
    let output = derived_path(&target, outdir, action.name());
    print_header(action.name(), &target, Some(&output));

    let mut notebook = JupyterNotebook::read_from_file(&target)?;
    let config = opts.run_config(target.parent().map(Path::to_path_buf));
    let summary = run_notebook(&config, &mut notebook, Some(Box::new(ProgressCallback))).await?;

    if action == Action::Work {
        let outputs = remove_outputs(&mut notebook);
        let text = remove_solution_text(&mut notebook);
        let code = remove_solution_code(&mut notebook);
        println!("removed {} code outputs", outputs.scrubbed);
        println!("scrubbed {} markdown cells from notebook", text);
        println!("scrubbed {} code cells from notebook", code);
    }

    notebook.write_to_file(&output)?;
    println!("wrote {}", output.display());

    let colour = if summary.failed > 0 {
        colors::YELLOW
    } else {
        colors::GREEN
    };
    println!(
        "{} {} cells in {:.2}s",
        colors::paint(colour, "Completed"),
        summary.executed,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Remove all outputs from `target`, overwriting it.
pub fn clean(target: &Path) -> anyhow::Result<()> {
    if !target.is_file() {
        anyhow::bail!("Notebook not found: {}", target.display());
    }
    print_header("clean", target, None);

    let mut notebook = JupyterNotebook::read_from_file(target)?;
    let removed = remove_outputs(&mut notebook);
    notebook.write_to_file(target)?;

    println!("removed {} code outputs", removed.scrubbed);
    println!("wrote {}", target.display());
    Ok(())
}

fn print_header(action: &str, target: &Path, output: Option<&Path>) {
    let rule = colors::paint(colors::DIM, "-".repeat(20));
    println!("{}", rule);
    println!("{} {}", colors::paint(colors::BOLD, action), target.display());
    if let Some(output) = output {
        println!("  -> {}", output.display());
    }
    println!("{}", rule);
}
