//! Repository driver trait and the git CLI implementation

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Error types for driver operations
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Failed to spawn git: {0}")]
    Spawn(String),

    #[error("git {args} failed: {stderr}")]
    Command {
        args: String,
        stdout: String,
        stderr: String,
    },
}

/// Captured output of one git invocation
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl GitOutput {
    /// Combined stdout and stderr, in that order
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Executes git subcommands against a working directory.
///
/// `run` resolves to `Ok` whenever the process could be launched, even when
/// git exits non-zero; callers inspect [`GitOutput::success`]. Use `run_ok`
/// when a non-zero exit should become an error outright.
#[async_trait]
pub trait GitDriver: Send + Sync {
    /// Run a git subcommand in `workdir` and capture its output
    async fn run(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput, GitError>;

    /// Run a git subcommand, treating a non-zero exit as an error
    async fn run_ok(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
        let output = self.run(workdir, args).await?;
        if !output.success {
            return Err(GitError::Command {
                args: args.join(" "),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

/// Production driver shelling out to the `git` binary
#[derive(Debug, Clone, Default)]
pub struct CliGitDriver;

impl CliGitDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitDriver for CliGitDriver {
    async fn run(&self, workdir: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
        debug!(?workdir, ?args, "CliGitDriver::run: called");

        let output = Command::new("git")
            .args(args)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|e| GitError::Spawn(e.to_string()))?;

        let result = GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        };
        debug!(success = result.success, "CliGitDriver::run: finished");

        Ok(result)
    }
}
