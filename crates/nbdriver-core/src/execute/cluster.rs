//! Waiting for an external worker cluster to settle.
//!
//! Fragments that start or stop the cluster return before the cluster has
//! actually changed size. The guard polls a membership service a bounded
//! number of times so that later fragments are less likely to race it. It
//! never fails: giving up is only logged.

use std::fmt;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{ClusterGuardConfig, MembershipCommand};
use crate::error::{Error, Result};

/// Reports the current size of the worker cluster.
#[allow(async_fn_in_trait)]
pub trait MembershipService {
    /// Number of live cluster members.
    async fn member_count(&self) -> Result<usize>;
}

/// Membership service backed by an external command that prints the count.
#[derive(Debug, Clone, Default)]
pub struct CommandMembership {
    command: MembershipCommand,
}

impl CommandMembership {
    /// Create a service running `command`.
    pub fn new(command: MembershipCommand) -> Self {
        Self { command }
    }
}

impl MembershipService for CommandMembership {
    async fn member_count(&self) -> Result<usize> {
        let query = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.command.timeout, query)
            .await
            .map_err(|_| {
                Error::Membership(format!(
                    "'{}' did not answer within {:?}",
                    self.command.program, self.command.timeout
                ))
            })?
            .map_err(|e| {
                Error::Membership(format!("failed to run '{}': {}", self.command.program, e))
            })?;

        if !output.status.success() {
            return Err(Error::Membership(format!(
                "'{}' exited with {}",
                self.command.program, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse()
            .map_err(|e| Error::Membership(format!("unexpected output {:?}: {}", stdout.trim(), e)))
    }
}

/// Condition to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    /// Wait until no members remain (after a stop).
    AwaitEmpty,
    /// Wait until at least one member is up (after a start).
    AwaitNonEmpty,
}

impl ClusterMode {
    fn is_satisfied(self, count: usize) -> bool {
        match self {
            ClusterMode::AwaitEmpty => count == 0,
            ClusterMode::AwaitNonEmpty => count > 0,
        }
    }

    /// Progress marker logged per unsuccessful attempt.
    pub fn marker(self) -> char {
        match self {
            ClusterMode::AwaitEmpty => '@',
            ClusterMode::AwaitNonEmpty => '#',
        }
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterMode::AwaitEmpty => f.write_str("stop"),
            ClusterMode::AwaitNonEmpty => f.write_str("start"),
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// The condition held on the given attempt.
    Reached { attempts: u32 },
    /// The condition never held.
    GaveUp { attempts: u32 },
}

/// Bounded poller for the membership service.
pub struct ClusterGuard<M> {
    membership: M,
    config: ClusterGuardConfig,
}

impl<M: MembershipService> ClusterGuard<M> {
    /// Create a guard.
    pub fn new(membership: M, config: ClusterGuardConfig) -> Self {
        Self { membership, config }
    }

    /// Borrow the membership service.
    pub fn membership(&self) -> &M {
        &self.membership
    }

    /// Conditions to wait for after running `code`, in order.
    ///
    /// A stop is awaited before a start, so a restart fragment waits for both.
    pub fn modes_for(&self, code: &str) -> Vec<ClusterMode> {
        let mut modes = Vec::new();
        if code.contains(&self.config.stop_directive) {
            modes.push(ClusterMode::AwaitEmpty);
        }
        if code.contains(&self.config.start_directive) {
            modes.push(ClusterMode::AwaitNonEmpty);
        }
        modes
    }

    /// Poll until `mode` holds or the attempts run out.
    pub async fn await_condition(&self, mode: ClusterMode) -> Convergence {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            match self.membership.member_count().await {
                Ok(count) if mode.is_satisfied(count) => {
                    tracing::info!(attempt, count, "Cluster {} complete", mode);
                    return Convergence::Reached { attempts: attempt };
                }
                Ok(count) => tracing::debug!(attempt, count, "Cluster {} pending", mode),
                Err(e) => tracing::debug!(attempt, "Cluster {} pending: {}", mode, e),
            }

            tracing::info!(
                marker = %mode.marker(),
                "Waiting for cluster {} ({}/{})",
                mode,
                attempt,
                max_attempts
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        tracing::warn!(
            "Cluster {} did not converge after {} attempts",
            mode,
            max_attempts
        );
        Convergence::GaveUp {
            attempts: max_attempts,
        }
    }
}
