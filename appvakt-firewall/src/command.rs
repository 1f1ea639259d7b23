//! Bounded-wait execution of platform firewall tools.
//!
//! Every mutation and query in this crate goes through [`CommandRunner`], so
//! drivers never block a caller indefinitely on a wedged external tool and
//! tests can script the platform's behavior.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use appvakt_core::error::ControlError;

/// Captured result of one tool invocation.
///
/// A non-zero exit is not an error at this layer: call sites decide whether
/// a failed probe means "absent" or "broken".
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Platform error text for failure messages, preferring stderr.
    pub fn error_text(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if text.is_empty() {
            format!("exit status {:?}", self.status)
        } else {
            text.to_string()
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting at most the configured bound.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ControlError>;
}

/// Runs real commands with a per-invocation timeout.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ControlError> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ControlError::CommandTimeout {
            command: format!("{} {}", program, args.join(" ")),
            timeout: self.timeout,
        })?
        .map_err(ControlError::Io)?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
