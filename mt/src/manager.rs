//! Facade composing the registry, orchestrator, and driver
//!
//! The manager is the single public entry point: it binds one base repository
//! and one worktree root for the lifetime of an orchestration session, hands
//! out isolated checkouts, and is the only component that mutates the base
//! repository's working tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::git::{CliGitDriver, GitContext, GitDriver, GitError};
use crate::merge::{MergeConfig, MergeError, MergeOrchestrator, MergeResult};
use crate::worktree::{Worktree, WorktreeError, WorktreeRegistry};

/// Error types for manager operations
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Worktree(#[from] WorktreeError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Coordinates isolated worktrees for one base repository and merges their
/// branches back.
///
/// Bound at construction to a base repository (must be a git checkout on a
/// branch) and a worktree root directory; both must exist. One manager per
/// orchestration session; call [`Manager::cleanup_all`] when done.
pub struct Manager {
    repo_root: PathBuf,
    base_branch: String,
    driver: Arc<dyn GitDriver>,
    registry: WorktreeRegistry,
    orchestrator: MergeOrchestrator,
}

impl Manager {
    /// Create a manager using the production git CLI driver
    pub async fn new(
        repo_root: impl Into<PathBuf>,
        worktree_root: impl Into<PathBuf>,
    ) -> Result<Self, ManagerError> {
        Self::with_driver(Arc::new(CliGitDriver::new()), repo_root, worktree_root).await
    }

    /// Create a manager with a caller-supplied repository driver
    pub async fn with_driver(
        driver: Arc<dyn GitDriver>,
        repo_root: impl Into<PathBuf>,
        worktree_root: impl Into<PathBuf>,
    ) -> Result<Self, ManagerError> {
        let repo_root = repo_root.into();
        let worktree_root = worktree_root.into();
        debug!(?repo_root, ?worktree_root, "Manager::with_driver: called");

        if !repo_root.is_dir() {
            return Err(ManagerError::InvalidConfiguration(format!(
                "Repository path does not exist: {}",
                repo_root.display()
            )));
        }
        if !worktree_root.is_dir() {
            return Err(ManagerError::InvalidConfiguration(format!(
                "Worktree root does not exist: {}",
                worktree_root.display()
            )));
        }

        let probe = driver.run(&repo_root, &["rev-parse", "--git-dir"]).await?;
        if !probe.success {
            return Err(ManagerError::InvalidConfiguration(format!(
                "Not a git repository: {}",
                repo_root.display()
            )));
        }

        // Capture the merge target once; detached HEAD has no branch to
        // merge into
        let head = driver.run(&repo_root, &["symbolic-ref", "--short", "HEAD"]).await?;
        if !head.success {
            return Err(ManagerError::InvalidConfiguration(format!(
                "Base repository is on a detached HEAD: {}",
                repo_root.display()
            )));
        }
        let base_branch = head.stdout.trim().to_string();

        info!(%base_branch, "Manager bound to base repository {:?}", repo_root);

        let registry = WorktreeRegistry::new(Arc::clone(&driver), &repo_root, &worktree_root);
        let orchestrator = MergeOrchestrator::new(Arc::clone(&driver), &repo_root, base_branch.clone());

        Ok(Self {
            repo_root,
            base_branch,
            driver,
            registry,
            orchestrator,
        })
    }

    /// Create a manager from loaded configuration, creating the configured
    /// worktree root if needed
    pub async fn with_config(repo_root: impl Into<PathBuf>, config: &Config) -> Result<Self, ManagerError> {
        let worktree_root = &config.worktree.root_dir;
        tokio::fs::create_dir_all(worktree_root).await.map_err(|e| {
            ManagerError::InvalidConfiguration(format!(
                "Failed to create worktree root {}: {}",
                worktree_root.display(),
                e
            ))
        })?;
        Self::new(repo_root, worktree_root).await
    }

    /// The branch all merges target
    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// The base repository path
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Provision an isolated checkout on a new branch rooted at the base
    /// repository's HEAD. Returns the worktree's filesystem path.
    pub async fn create_branch_worktree(
        &self,
        branch_id: &str,
        branch_name: &str,
    ) -> Result<PathBuf, ManagerError> {
        let worktree = self.registry.create(branch_id, branch_name).await?;
        Ok(worktree.path)
    }

    /// Look up a provisioned worktree's record
    pub fn worktree(&self, branch_id: &str) -> Result<Worktree, ManagerError> {
        Ok(self.registry.get(branch_id)?)
    }

    /// A driver handle scoped to a worktree's directory
    pub fn git_context_for_branch(&self, branch_id: &str) -> Result<GitContext, ManagerError> {
        let worktree = self.registry.get(branch_id)?;
        Ok(GitContext::new(Arc::clone(&self.driver), worktree.path))
    }

    /// Merge every registered branch into the base branch, in creation order.
    /// See [`MergeOrchestrator::merge_branches`].
    pub async fn merge_branches(&self, config: MergeConfig) -> Result<Vec<MergeResult>, ManagerError> {
        Ok(self.orchestrator.merge_branches(&self.registry, config).await?)
    }

    /// Write and stage resolved content for a conflicting path
    pub async fn resolve_conflict(&self, path: &str, content: &str) -> Result<(), ManagerError> {
        Ok(self.orchestrator.resolve_conflict(path, content).await?)
    }

    /// Finalize the stopped merge and resume with the remaining branches
    pub async fn continue_merge(&self, message: &str) -> Result<Vec<MergeResult>, ManagerError> {
        Ok(self.orchestrator.continue_merge(message).await?)
    }

    /// Discard the stopped merge, leaving the base branch unchanged for it
    pub async fn abort_merge(&self) -> Result<Vec<MergeResult>, ManagerError> {
        Ok(self.orchestrator.abort_merge().await?)
    }

    /// Branch id currently stopped on conflict, if any
    pub async fn stopped_branch(&self) -> Option<String> {
        self.orchestrator.stopped_branch().await
    }

    /// Tear down every provisioned worktree and discard any stopped merge.
    ///
    /// Waits for in-flight merge operations to finish first. Idempotent:
    /// calling twice is a no-op the second time.
    pub async fn cleanup_all(&self) -> Result<(), ManagerError> {
        debug!("Manager::cleanup_all: called");

        if !self.orchestrator.abort_for_cleanup().await {
            warn!("Base repository may need manual attention after failed merge abort");
        }

        self.registry.cleanup_all().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("repo_root", &self.repo_root)
            .field("base_branch", &self.base_branch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::process::Command;

    async fn setup_git_repo(dir: &Path) {
        Command::new("git").args(["init"]).current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        Command::new("git")
            .args(["commit", "--allow-empty", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_new_requires_existing_paths() {
        let dir = tempdir().unwrap();

        let result = Manager::new(dir.path().join("missing"), dir.path()).await;
        assert!(matches!(result, Err(ManagerError::InvalidConfiguration(_))));

        let result = Manager::new(dir.path(), dir.path().join("missing")).await;
        assert!(matches!(result, Err(ManagerError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_new_requires_git_repository() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();

        let result = Manager::new(repo_dir.path(), worktree_dir.path()).await;
        assert!(matches!(result, Err(ManagerError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_detached_head() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        Command::new("git")
            .args(["checkout", "--detach"])
            .current_dir(repo_dir.path())
            .output()
            .await
            .unwrap();

        let result = Manager::new(repo_dir.path(), worktree_dir.path()).await;
        assert!(matches!(result, Err(ManagerError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_captures_base_branch() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        let manager = Manager::new(repo_dir.path(), worktree_dir.path()).await.unwrap();
        assert!(!manager.base_branch().is_empty());
    }

    #[tokio::test]
    async fn test_git_context_scoped_to_worktree() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        let manager = Manager::new(repo_dir.path(), worktree_dir.path()).await.unwrap();
        let path = manager.create_branch_worktree("task-1", "mt/task-1").await.unwrap();

        let ctx = manager.git_context_for_branch("task-1").unwrap();
        assert_eq!(ctx.workdir(), path);

        let output = ctx.run_ok(&["rev-parse", "--abbrev-ref", "HEAD"]).await.unwrap();
        assert_eq!(output.stdout.trim(), "mt/task-1");

        let missing = manager.git_context_for_branch("nope");
        assert!(matches!(missing, Err(ManagerError::Worktree(WorktreeError::NotFound(_)))));

        manager.cleanup_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_all_idempotent() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        let manager = Manager::new(repo_dir.path(), worktree_dir.path()).await.unwrap();
        manager.create_branch_worktree("task-1", "mt/task-1").await.unwrap();

        manager.cleanup_all().await.unwrap();
        manager.cleanup_all().await.unwrap();

        // The id is free again after cleanup
        manager.create_branch_worktree("task-1", "mt/task-1").await.unwrap();
        manager.cleanup_all().await.unwrap();
    }
}
