//! nbdriver CLI - run, scrub and map Jupyter notebooks.

mod colors;
mod dataflow;
mod process;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use nbdriver_core::{KernelSpec, MembershipCommand, RunConfig};

use process::Action;

#[derive(Parser)]
#[command(name = "nbdriver")]
#[command(about = "Run, scrub and map Jupyter notebooks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook, then strip outputs and solutions for distribution
    Work {
        /// Path to the notebook (.ipynb file)
        target: PathBuf,

        /// Existing directory for <name>-work.ipynb
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        opts: KernelArgs,
    },

    /// Run a notebook and keep its outputs
    Sol {
        /// Path to the notebook (.ipynb file)
        target: PathBuf,

        /// Existing directory for <name>-sol.ipynb
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        opts: KernelArgs,
    },

    /// Run a notebook to check that it executes
    Check {
        /// Path to the notebook (.ipynb file)
        target: PathBuf,

        /// Existing directory for <name>-check.ipynb
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        opts: KernelArgs,
    },

    /// Remove all outputs, overwriting the notebook in place
    Clean {
        /// Path to the notebook (.ipynb file)
        target: PathBuf,
    },

    /// Draw the files notebooks read and write as a graph
    Dataflow {
        /// Notebook file names, relative to --directory
        targets: Vec<String>,

        /// Folder containing the notebooks
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// Output file; the extension picks the format (.dot writes DOT text)
        #[arg(short, long, default_value = "mydataflow.pdf")]
        output: PathBuf,
    },
}

/// Options for the kernel and the cluster membership service.
#[derive(Args, Clone, Default)]
struct KernelArgs {
    /// Kernel program (default: $NBDRIVER_KERNEL_PATH, then nbdriver-kernel on PATH,
    /// then the bundled Jupyter bridge under python3)
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// Extra argument for the kernel program, or the Jupyter kernel name for
    /// the bundled bridge (repeatable)
    #[arg(long = "kernel-arg", allow_hyphen_values = true)]
    kernel_args: Vec<String>,

    /// Seconds to wait for each cell's reply
    #[arg(long, value_name = "SECS")]
    reply_timeout: Option<u64>,

    /// Program printing the cluster member count
    #[arg(long = "membership-cmd")]
    membership_cmd: Option<String>,

    /// Argument for the membership program (repeatable)
    #[arg(long = "membership-arg", allow_hyphen_values = true)]
    membership_args: Vec<String>,

    /// Seconds one membership query may take
    #[arg(long, value_name = "SECS")]
    membership_timeout: Option<u64>,
}

impl KernelArgs {
    /// Build the run configuration, starting the kernel in `working_dir`.
    fn run_config(&self, working_dir: Option<PathBuf>) -> RunConfig {
        let mut config = RunConfig {
            kernel: KernelSpec {
                program: self.kernel.clone(),
                args: self.kernel_args.clone(),
                working_dir,
            },
            ..Default::default()
        };

        if let Some(secs) = self.reply_timeout {
            config.executor.reply_timeout = Duration::from_secs(secs);
        }
        if let Some(program) = &self.membership_cmd {
            config.membership = MembershipCommand {
                program: program.clone(),
                args: self.membership_args.clone(),
                ..Default::default()
            };
        }
        if let Some(secs) = self.membership_timeout {
            config.membership.timeout = Duration::from_secs(secs);
        }

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Helper to format nbdriver-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<nbdriver_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Work {
            target,
            output,
            opts,
        } => {
            process::execute(Action::Work, &target, &output, &opts)
                .await
                .map_err(format_error)?;
        }

        Commands::Sol {
            target,
            output,
            opts,
        } => {
            process::execute(Action::Sol, &target, &output, &opts)
                .await
                .map_err(format_error)?;
        }

        Commands::Check {
            target,
            output,
            opts,
        } => {
            process::execute(Action::Check, &target, &output, &opts)
                .await
                .map_err(format_error)?;
        }

        Commands::Clean { target } => process::clean(&target).map_err(format_error)?,

        Commands::Dataflow {
            targets,
            directory,
            output,
        } => dataflow::execute(&targets, &directory, &output)?,
    }

    Ok(())
}
