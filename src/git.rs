use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::config::GitConfig;

/// Name of the metadata entry git keeps inside a working copy
pub const GIT_METADATA_DIR: &str = ".git";

/// Captured output of one git invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn from_process(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }
    }
}

/// Version control executor used by the reconciler
///
/// An `Err` means git could not be run at all (missing binary, timeout).
/// A git failure is an `Ok` with a non-zero exit code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Clone `remote_address` into `destination`
    async fn clone_repository(&self, remote_address: &str, destination: &Path) -> Result<GitOutput>;

    /// Update the working copy at `working_directory` from its upstream
    async fn pull(&self, working_directory: &Path) -> Result<GitOutput>;
}

/// Executor that shells out to the git CLI
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    locale: String,
    timeout: Duration,
    fast_forward_only: bool,
}

impl GitCli {
    /// Create a new git executor with the given configuration
    pub fn new(config: &GitConfig) -> Self {
        Self {
            program: config.program.clone(),
            locale: config.locale.clone(),
            timeout: config.operation_timeout(),
            fast_forward_only: config.fast_forward_only,
        }
    }

    fn command(&self) -> AsyncCommand {
        let mut command = AsyncCommand::new(&self.program);
        command
            .env("LANG", &self.locale)
            .env("LC_ALL", &self.locale)
            .env("LANGUAGE", &self.locale)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, mut command: AsyncCommand, what: &str) -> Result<GitOutput> {
        let output = match timeout(self.timeout, command.output()).await {
            Ok(result) => result.with_context(|| format!("Failed to execute git {}", what))?,
            Err(_) => {
                return Err(anyhow!(
                    "git {} timed out after {}s",
                    what,
                    self.timeout.as_secs()
                ))
            }
        };

        Ok(GitOutput::from_process(output))
    }
}

#[async_trait]
impl GitExecutor for GitCli {
    async fn clone_repository(&self, remote_address: &str, destination: &Path) -> Result<GitOutput> {
        debug!("git clone {} {}", remote_address, destination.display());

        // Nested relative paths need their parent directories
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directory")?;
        }

        let mut command = self.command();
        command.arg("clone").arg(remote_address).arg(destination);
        self.run(command, "clone").await
    }

    async fn pull(&self, working_directory: &Path) -> Result<GitOutput> {
        debug!("git pull in {}", working_directory.display());

        let mut command = self.command();
        command.arg("pull").current_dir(working_directory);
        if self.fast_forward_only {
            command.arg("--ff-only");
        }
        self.run(command, "pull").await
    }
}
