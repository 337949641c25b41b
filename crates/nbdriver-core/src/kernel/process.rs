//! Kernel process management.
//!
//! Provides `KernelProcess` for spawning an interpreter process and talking
//! to it over its standard streams.
//!
//! When no kernel program is configured, a bundled Python bridge is run
//! instead. It relays the line protocol to a Jupyter kernel through
//! `jupyter_client`, so `jupyter_client` and a kernel such as `ipykernel`
//! must be installed for that Python.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, Command};

use crate::config::{KERNEL_PATH_ENV, KernelSpec};
use crate::error::{Error, Result};

use super::channels::{KernelChannels, Telemetry};
use super::connection::KernelConnection;
use super::protocol::{ReplyStatus, RequestId, WireMessage};

/// Default kernel program name looked up on `PATH`.
const DEFAULT_KERNEL_PROGRAM: &str = "nbdriver-kernel";

/// Interpreters tried, in order, for the bundled bridge.
const BRIDGE_INTERPRETERS: [&str; 2] = ["python3", "python"];

/// Bridge from the line protocol to a Jupyter kernel.
pub const BRIDGE_SCRIPT: &str = include_str!("bridge.py");

/// How long a kernel gets to exit after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running kernel process.
///
/// The process is killed when the handle is dropped, so every exit path
/// releases it; [`shutdown`](Self::shutdown) is the graceful variant.
pub struct KernelProcess {
    /// The child process.
    child: Child,
    /// Channels over the child's stdio.
    connection: KernelConnection<ChildStdin>,
}

impl KernelProcess {
    /// Spawn a kernel process.
    ///
    /// Looks for the kernel program in the following order:
    /// 1. `spec.program` (a path, or a name resolved on `PATH`)
    /// 2. `NBDRIVER_KERNEL_PATH` environment variable
    /// 3. `nbdriver-kernel` on `PATH`
    /// 4. The bundled Jupyter bridge under `python3` or `python`
    pub async fn start(spec: &KernelSpec) -> Result<Self> {
        let Launch { program, args } = find_kernel_program(spec)?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            Error::KernelStartup(format!(
                "Failed to spawn kernel '{}': {}",
                program.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::KernelStartup("Failed to get kernel stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::KernelStartup("Failed to get kernel stdout".to_string()))?;

        tracing::debug!(pid = ?child.id(), "Started kernel {}", program.display());

        Ok(Self {
            child,
            connection: KernelConnection::new(stdout, stdin),
        })
    }

    /// Process ID of the kernel, if it is still running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Ask the kernel to exit, killing it if it does not within a grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Err(e) = self.connection.send(&WireMessage::shutdown_request()).await {
            tracing::debug!("Shutdown request not delivered: {}", e);
        }
        self.connection.close_writer();

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Kernel exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                tracing::warn!("Kernel did not exit within {:?}, killing it", SHUTDOWN_GRACE);
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

impl KernelChannels for KernelProcess {
    async fn send_code(&mut self, code: &str) -> Result<RequestId> {
        self.connection.send_code(code).await
    }

    async fn await_reply(
        &mut self,
        request: &RequestId,
        timeout: Duration,
    ) -> Result<ReplyStatus> {
        self.connection.await_reply(request, timeout).await
    }

    async fn poll_telemetry(&mut self, timeout: Duration) -> Result<Telemetry> {
        self.connection.poll_telemetry(timeout).await
    }
}

/// Program and arguments used to start a kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Launch {
    program: PathBuf,
    args: Vec<String>,
}

impl Launch {
    fn direct(program: PathBuf, spec: &KernelSpec) -> Self {
        Self {
            program,
            args: spec.args.clone(),
        }
    }

    /// Run the bundled bridge; `spec.args` go to the bridge (kernel name).
    fn bridge(interpreter: PathBuf, spec: &KernelSpec) -> Self {
        let mut args = vec!["-c".to_string(), BRIDGE_SCRIPT.to_string()];
        args.extend(spec.args.iter().cloned());
        Self {
            program: interpreter,
            args,
        }
    }
}

/// Resolve how to start the kernel.
fn find_kernel_program(spec: &KernelSpec) -> Result<Launch> {
    // 1. Explicit program
    if let Some(program) = &spec.program {
        if program.exists() {
            return Ok(Launch::direct(program.clone(), spec));
        }
        let path = which::which(program).map_err(|e| {
            Error::KernelStartup(format!(
                "Kernel program '{}' not found: {}",
                program.display(),
                e
            ))
        })?;
        return Ok(Launch::direct(path, spec));
    }

    // 2. Environment variable
    if let Ok(path) = std::env::var(KERNEL_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(Launch::direct(path, spec));
        }
        tracing::warn!("{} points to missing file {}", KERNEL_PATH_ENV, path.display());
    }

    // 3. System PATH
    if let Ok(path) = which::which(DEFAULT_KERNEL_PROGRAM) {
        return Ok(Launch::direct(path, spec));
    }

    // 4. Bundled bridge
    if let Some(interpreter) = BRIDGE_INTERPRETERS
        .iter()
        .find_map(|name| which::which(name).ok())
    {
        tracing::debug!("Using the Jupyter bridge under {}", interpreter.display());
        return Ok(Launch::bridge(interpreter, spec));
    }

    Err(Error::KernelStartup(format!(
        "Could not find {} or a Python interpreter. Pass --kernel or set {}.",
        DEFAULT_KERNEL_PROGRAM, KERNEL_PATH_ENV
    )))
}
