//! Run configuration.
//!
//! All wait bounds and special directives live here, with the defaults the
//! driver uses when nothing is overridden on the command line.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the kernel program.
pub const KERNEL_PATH_ENV: &str = "NBDRIVER_KERNEL_PATH";

/// Default bound on waiting for a fragment's reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(300);

/// Default quiet period that ends a telemetry burst.
pub const DEFAULT_TELEMETRY_QUIET: Duration = Duration::from_secs(2);

/// Default number of membership queries per cluster wait.
pub const DEFAULT_CLUSTER_ATTEMPTS: u32 = 10;

/// Default delay between membership queries.
pub const DEFAULT_CLUSTER_DELAY: Duration = Duration::from_secs(5);

/// Everything needed to run one notebook.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Kernel process to start.
    pub kernel: KernelSpec,
    /// Per-fragment wait bounds.
    pub executor: ExecutorConfig,
    /// Cluster directive handling.
    pub cluster: ClusterGuardConfig,
    /// Command reporting the cluster's member count.
    pub membership: MembershipCommand,
}

/// How to start the kernel process.
#[derive(Debug, Clone, Default)]
pub struct KernelSpec {
    /// Kernel program. Looked up via the environment and `PATH` when unset.
    pub program: Option<PathBuf>,
    /// Extra arguments for the kernel program.
    pub args: Vec<String>,
    /// Working directory for the kernel, usually the notebook's directory.
    pub working_dir: Option<PathBuf>,
}

/// Wait bounds for a single fragment.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound on waiting for the synchronous reply.
    pub reply_timeout: Duration,
    /// Per-poll bound while draining telemetry.
    pub telemetry_quiet: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            telemetry_quiet: DEFAULT_TELEMETRY_QUIET,
        }
    }
}

/// Cluster directive detection and wait policy.
#[derive(Debug, Clone)]
pub struct ClusterGuardConfig {
    /// Maximum membership queries per wait.
    pub max_attempts: u32,
    /// Delay between unsuccessful queries.
    pub delay: Duration,
    /// Substring marking a fragment that stops the cluster.
    pub stop_directive: String,
    /// Substring marking a fragment that starts the cluster.
    pub start_directive: String,
}

impl Default for ClusterGuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CLUSTER_ATTEMPTS,
            delay: DEFAULT_CLUSTER_DELAY,
            stop_directive: "!ipcluster stop".to_string(),
            start_directive: "!ipcluster start".to_string(),
        }
    }
}

/// External command printing the current cluster member count.
#[derive(Debug, Clone)]
pub struct MembershipCommand {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Bound on one query. A query that runs longer counts as unreachable.
    pub timeout: Duration,
}

impl Default for MembershipCommand {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec![
                "-c".to_string(),
                "import ipyparallel; print(len(ipyparallel.Client()))".to_string(),
            ],
            timeout: DEFAULT_CLUSTER_DELAY,
        }
    }
}
