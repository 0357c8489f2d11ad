//! External process execution.
//!
//! Runs a prepared command under `tokio::process::Command` and captures its
//! combined output. No shell is involved.

use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use crate::task::{PreparedCommand, TaskStatus};

/// Result of running one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: TaskStatus,
    /// Stdout followed by stderr, lossily decoded.
    pub output: String,
    pub exit_code: Option<i32>,
}

/// Run `cmd` to completion. Spawn failures and non-zero exits both yield
/// [`TaskStatus::Error`].
pub async fn run_process(cmd: &PreparedCommand) -> ProcessOutcome {
    let start = Instant::now();

    let result = Command::new(&cmd.program)
        .args(&cmd.args)
        .envs(&cmd.env)
        .stdin(Stdio::null())
        .output()
        .await;

    match result {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            let status = if output.status.success() {
                TaskStatus::Success
            } else {
                TaskStatus::Error
            };
            tracing::debug!(
                program = %cmd.program,
                exit_code = ?output.status.code(),
                duration_ms = start.elapsed().as_millis(),
                "Process exited"
            );
            ProcessOutcome {
                status,
                output: text,
                exit_code: output.status.code(),
            }
        }
        Err(e) => {
            tracing::warn!(program = %cmd.program, error = %e, "Failed to start process");
            ProcessOutcome {
                status: TaskStatus::Error,
                output: format!("Failed to start '{}': {e}", cmd.program),
                exit_code: None,
            }
        }
    }
}
