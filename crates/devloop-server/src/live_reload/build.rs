//! External build step.
//!
//! Runs the configured command through the platform shell and records
//! whether it succeeded. The outcome is shared with the HTTP layer, which
//! serves a failure page while the last build is failed.

use std::process::Stdio;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::process::Command;

/// Result of the most recent build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Last build succeeded, or no build has run.
    #[default]
    Success,
    /// Last build exited non-zero or could not be started.
    Failed {
        /// Combined stdout and stderr.
        output: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// When the build finished.
        finished_at: DateTime<Utc>,
    },
}

impl BuildOutcome {
    /// Check whether this outcome is a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Build outcome shared between the coordinator and request handlers.
#[derive(Clone, Debug, Default)]
pub struct SharedOutcome(Arc<RwLock<BuildOutcome>>);

impl SharedOutcome {
    /// Check whether the last build failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.0.read().unwrap().is_failed()
    }

    /// Snapshot of the last outcome.
    #[must_use]
    pub fn get(&self) -> BuildOutcome {
        self.0.read().unwrap().clone()
    }

    pub(crate) fn set(&self, outcome: BuildOutcome) {
        *self.0.write().unwrap() = outcome;
    }
}

/// Runs the build command and publishes its outcome.
pub(crate) struct BuildRunner {
    command: String,
    outcome: SharedOutcome,
}

impl BuildRunner {
    pub(crate) fn new(command: String, outcome: SharedOutcome) -> Self {
        Self { command, outcome }
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }

    /// Run the command to completion and record the outcome.
    ///
    /// A command that cannot be started counts as a failed build.
    pub(crate) async fn run(&self) -> BuildOutcome {
        tracing::info!(command = %self.command, "Running build");
        let start = std::time::Instant::now();

        let outcome = match shell(&self.command)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                tracing::info!(elapsed_ms = start.elapsed().as_millis(), "Build succeeded");
                BuildOutcome::Success
            }
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                tracing::warn!(
                    exit_code = ?output.status.code(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Build failed"
                );
                BuildOutcome::Failed {
                    output: combined,
                    exit_code: output.status.code(),
                    finished_at: Utc::now(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, command = %self.command, "Failed to start build");
                BuildOutcome::Failed {
                    output: format!("Failed to start `{}`: {e}", self.command),
                    exit_code: None,
                    finished_at: Utc::now(),
                }
            }
        };

        self.outcome.set(outcome.clone());
        outcome
    }
}

#[cfg(target_os = "windows")]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);
    cmd
}
