//! Worktree registry for creating, tracking, and cleaning up git worktrees

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::git::{GitDriver, GitError};

/// Error types for worktree operations
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Worktree already exists: {0}")]
    Exists(String),

    #[error("Worktree not found: {0}")]
    NotFound(String),

    #[error("Invalid branch id: {0:?}")]
    InvalidId(String),

    #[error("Failed to create worktree: {0}")]
    CreateFailed(String),

    #[error("Failed to remove worktree: {0}")]
    RemoveFailed(String),

    #[error("Git command failed: {0}")]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One provisioned isolated checkout
#[derive(Debug, Clone)]
pub struct Worktree {
    /// Caller-chosen logical branch id, unique within a registry
    pub branch_id: String,

    /// Underlying git branch name
    pub branch: String,

    /// Absolute path of the worktree directory
    pub path: PathBuf,

    /// When the worktree was provisioned
    pub created_at: DateTime<Utc>,
}

/// Turn an arbitrary branch id into a filesystem-safe directory name.
///
/// Keeps `[A-Za-z0-9._-]`, maps everything else to `-`, and appends a short
/// content hash of the original id whenever anything was rewritten so that
/// distinct ids never collide on disk (`a/b` vs `a-b`).
pub fn sanitize_branch_id(branch_id: &str) -> Result<String, WorktreeError> {
    if branch_id.is_empty() {
        return Err(WorktreeError::InvalidId(branch_id.to_string()));
    }

    let mut name: String = branch_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    // Names beginning with '.' or '-' are hostile to tooling
    if name.starts_with('.') || name.starts_with('-') {
        name.insert_str(0, "wt");
    }

    if name != branch_id {
        let digest = Sha256::digest(branch_id.as_bytes());
        name.push('-');
        for byte in &digest[..4] {
            name.push_str(&format!("{:02x}", byte));
        }
    }

    Ok(name)
}

struct RegistryInner {
    worktrees: HashMap<String, Worktree>,

    /// Ids claimed by an in-flight create, not yet provisioned
    pending: HashSet<String>,

    /// Creation order, the default merge order
    order: Vec<String>,
}

/// Registry of provisioned worktrees.
///
/// Creation and teardown run git against the base repository; the registry
/// map itself is the only shared mutable state and is locked only around map
/// updates, never across driver calls.
pub struct WorktreeRegistry {
    driver: Arc<dyn GitDriver>,
    repo_root: PathBuf,
    worktree_root: PathBuf,
    inner: Mutex<RegistryInner>,
}

impl WorktreeRegistry {
    pub fn new(
        driver: Arc<dyn GitDriver>,
        repo_root: impl Into<PathBuf>,
        worktree_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            driver,
            repo_root: repo_root.into(),
            worktree_root: worktree_root.into(),
            inner: Mutex::new(RegistryInner {
                worktrees: HashMap::new(),
                pending: HashSet::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Create a new worktree on a new branch rooted at the base repo's HEAD
    pub async fn create(&self, branch_id: &str, branch_name: &str) -> Result<Worktree, WorktreeError> {
        debug!(%branch_id, %branch_name, "WorktreeRegistry::create: called");

        let dir_name = sanitize_branch_id(branch_id)?;
        let worktree_path = self.worktree_root.join(&dir_name);

        // Claim the id before touching disk so a concurrent create of the
        // same id fails fast instead of racing on the filesystem
        {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            if inner.worktrees.contains_key(branch_id) || inner.pending.contains(branch_id) {
                debug!(%branch_id, "WorktreeRegistry::create: id already registered");
                return Err(WorktreeError::Exists(branch_id.to_string()));
            }
            inner.pending.insert(branch_id.to_string());
        }

        let result = self.provision(&worktree_path, branch_name).await;

        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.pending.remove(branch_id);

        result?;

        let worktree = Worktree {
            branch_id: branch_id.to_string(),
            branch: branch_name.to_string(),
            path: worktree_path,
            created_at: Utc::now(),
        };
        inner.worktrees.insert(branch_id.to_string(), worktree.clone());
        inner.order.push(branch_id.to_string());

        info!("Created worktree at {:?} on branch {}", worktree.path, worktree.branch);

        Ok(worktree)
    }

    async fn provision(&self, worktree_path: &Path, branch_name: &str) -> Result<(), WorktreeError> {
        tokio::fs::create_dir_all(&self.worktree_root)
            .await
            .map_err(|e| WorktreeError::CreateFailed(format!("Failed to create worktree root: {}", e)))?;

        let path_str = worktree_path.to_string_lossy();
        let output = self
            .driver
            .run(
                &self.repo_root,
                &["worktree", "add", path_str.as_ref(), "-b", branch_name, "HEAD"],
            )
            .await?;

        if !output.success {
            debug!("WorktreeRegistry::provision: git worktree add failed");
            return Err(WorktreeError::CreateFailed(output.stderr));
        }
        debug!("WorktreeRegistry::provision: git worktree add succeeded");

        Ok(())
    }

    /// Look up a registered worktree
    pub fn get(&self, branch_id: &str) -> Result<Worktree, WorktreeError> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .worktrees
            .get(branch_id)
            .cloned()
            .ok_or_else(|| WorktreeError::NotFound(branch_id.to_string()))
    }

    /// Check if a branch id is registered
    pub fn contains(&self, branch_id: &str) -> bool {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.worktrees.contains_key(branch_id)
    }

    /// Branch ids in creation order
    pub fn ids_in_creation_order(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.order.clone()
    }

    /// Number of registered worktrees
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.worktrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every registered worktree: directory, git registration, branch.
    ///
    /// Tolerates directories that were already deleted out from under us and
    /// is a no-op when nothing is registered, so calling twice is safe.
    pub async fn cleanup_all(&self) -> Result<(), WorktreeError> {
        debug!("WorktreeRegistry::cleanup_all: called");

        let worktrees: Vec<Worktree> = {
            let inner = self.inner.lock().expect("registry lock poisoned");
            inner.order.iter().filter_map(|id| inner.worktrees.get(id).cloned()).collect()
        };

        if worktrees.is_empty() {
            debug!("WorktreeRegistry::cleanup_all: nothing registered");
            return Ok(());
        }

        for wt in &worktrees {
            self.remove(wt).await?;
        }

        // Drop any stale administrative entries for directories deleted
        // behind git's back
        let _ = self.driver.run(&self.repo_root, &["worktree", "prune"]).await;

        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.worktrees.clear();
        inner.order.clear();

        info!("Cleaned up {} worktrees", worktrees.len());

        Ok(())
    }

    async fn remove(&self, wt: &Worktree) -> Result<(), WorktreeError> {
        debug!(branch_id = %wt.branch_id, "WorktreeRegistry::remove: called");

        if wt.path.exists() {
            let path_str = wt.path.to_string_lossy();
            let output = self
                .driver
                .run(&self.repo_root, &["worktree", "remove", path_str.as_ref(), "--force"])
                .await?;

            if !output.success {
                // Already deregistered on the git side
                if !output.stderr.contains("is not a working tree") {
                    debug!(branch_id = %wt.branch_id, "WorktreeRegistry::remove: git worktree remove failed");
                    return Err(WorktreeError::RemoveFailed(output.stderr));
                }
                debug!(branch_id = %wt.branch_id, "WorktreeRegistry::remove: already removed");
            }
        } else {
            warn!("Worktree {:?} already deleted, deregistering only", wt.path);
        }

        // Delete the branch, best effort
        let _ = self.driver.run(&self.repo_root, &["branch", "-D", &wt.branch]).await;
        debug!(branch_id = %wt.branch_id, "WorktreeRegistry::remove: branch deletion attempted");

        Ok(())
    }
}
