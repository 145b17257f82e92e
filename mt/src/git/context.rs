//! Driver handle scoped to one working directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{GitDriver, GitError, GitOutput};

/// A [`GitDriver`] pinned to a single working directory.
///
/// Handed out by the manager so callers can run git commands inside a
/// specific worktree without knowing its on-disk location.
#[derive(Clone)]
pub struct GitContext {
    driver: Arc<dyn GitDriver>,
    workdir: PathBuf,
}

impl GitContext {
    pub fn new(driver: Arc<dyn GitDriver>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            workdir: workdir.into(),
        }
    }

    /// The working directory every command runs in
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a git subcommand in this context's working directory
    pub async fn run(&self, args: &[&str]) -> Result<GitOutput, GitError> {
        self.driver.run(&self.workdir, args).await
    }

    /// Run a git subcommand, treating a non-zero exit as an error
    pub async fn run_ok(&self, args: &[&str]) -> Result<GitOutput, GitError> {
        self.driver.run_ok(&self.workdir, args).await
    }
}

impl std::fmt::Debug for GitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitContext").field("workdir", &self.workdir).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::CliGitDriver;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_context_runs_in_workdir() {
        let dir = tempdir().unwrap();
        let ctx = GitContext::new(Arc::new(CliGitDriver::new()), dir.path());

        ctx.run_ok(&["init"]).await.unwrap();

        let output = ctx.run_ok(&["rev-parse", "--git-dir"]).await.unwrap();
        assert!(output.stdout.contains(".git"));
        assert_eq!(ctx.workdir(), dir.path());
    }
}
