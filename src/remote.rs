//! Command execution seam: everything the tool runs, locally or over
//! ssh, goes through [`RemoteRunner`] so stages never touch
//! `std::process` directly and tests can script the outside world.

use std::fmt::{Display, Formatter};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Timeouts;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

#[derive(Debug)]
pub enum RemoteError {
    /// Process could not be started at all.
    Spawn { command: String, message: String },
    NonZeroExit { host: String, command: String, status: i32, stderr: String },
    Timeout { host: String, command: String, secs: u64 },
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { command, message } => {
                write!(f, "could not start '{}': {}", command, message)
            }
            Self::NonZeroExit { host, command, status, stderr } => {
                write!(f, "'{}' on {} exited with {}: {}", command, host, status, stderr.trim())
            }
            Self::Timeout { host, command, secs } => {
                write!(f, "'{}' on {} timed out after {}s", command, host, secs)
            }
        }
    }
}

impl std::error::Error for RemoteError {}

/// All side effects on the correlator, processing, and pipeline hosts.
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Runs a shell command on a remote host; non-zero exit is an error.
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Copies files between hosts (scp syntax for the endpoints).
    async fn transfer(&self, source: &str, destination: &str) -> Result<(), RemoteError>;

    /// Whether a path (glob allowed) matches anything on the host.
    async fn file_exists(&self, host: &str, glob: &str) -> Result<bool, RemoteError>;

    /// Runs a shell command on the processing host we are logged into.
    async fn local(&self, command: &str) -> Result<CommandOutput, RemoteError>;
}

/// Production runner: ssh/scp/bash child processes with timeouts.
#[derive(Debug, Clone)]
pub struct SshRunner {
    command_timeout: Duration,
    transfer_timeout: Duration,
}

impl SshRunner {
    pub fn new(timeouts: &Timeouts) -> Self {
        Self {
            command_timeout: Duration::from_secs(timeouts.command_secs),
            transfer_timeout: Duration::from_secs(timeouts.transfer_secs),
        }
    }

    async fn run(
        &self,
        host: &str,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        let label = format!("{} {}", program, args.join(" "));
        tracing::debug!(host, command = %label, "running command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| RemoteError::Timeout {
                host: host.to_string(),
                command: label.clone(),
                secs: timeout.as_secs(),
            })?
            .map_err(|e| RemoteError::Spawn { command: label, message: e.to_string() })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    fn checked(
        host: &str,
        command: &str,
        output: CommandOutput,
    ) -> Result<CommandOutput, RemoteError> {
        if output.status != 0 {
            return Err(RemoteError::NonZeroExit {
                host: host.to_string(),
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl RemoteRunner for SshRunner {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, RemoteError> {
        let output = self.run(host, "ssh", &[host, command], self.command_timeout).await?;
        Self::checked(host, command, output)
    }

    async fn transfer(&self, source: &str, destination: &str) -> Result<(), RemoteError> {
        let command = format!("scp {} {}", source, destination);
        let output = self
            .run("scp", "scp", &["-r", source, destination], self.transfer_timeout)
            .await?;
        Self::checked("scp", &command, output)?;
        Ok(())
    }

    async fn file_exists(&self, host: &str, glob: &str) -> Result<bool, RemoteError> {
        let command = format!("ls -d {}", glob);
        let output = self.run(host, "ssh", &[host, &command], self.command_timeout).await?;
        Ok(output.status == 0)
    }

    async fn local(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let output = self.run("eee", "bash", &["-c", command], self.command_timeout).await?;
        Self::checked("eee", command, output)
    }
}
