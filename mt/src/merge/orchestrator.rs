//! Merge orchestrator: sequential merge-back with a resumable session

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::git::GitDriver;
use crate::worktree::{Worktree, WorktreeRegistry};

use super::conflict::{self, ConflictFile};
use super::{MergeConfig, MergeError};

/// Outcome for one branch, in the order branches were processed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    /// Caller-chosen branch id
    pub branch_id: String,

    /// Whether the branch landed on the base branch
    pub success: bool,

    /// Resulting commit on the base branch; empty unless `success`
    pub commit_sha: String,

    /// Structured conflict records; non-empty only when the merge stopped on
    /// overlapping changes
    pub conflicts: Vec<ConflictFile>,
}

impl MergeResult {
    fn merged(branch_id: String, commit_sha: String) -> Self {
        Self {
            branch_id,
            success: true,
            commit_sha,
            conflicts: Vec::new(),
        }
    }

    fn conflicted(branch_id: String, conflicts: Vec<ConflictFile>) -> Self {
        Self {
            branch_id,
            success: false,
            commit_sha: String::new(),
            conflicts,
        }
    }
}

/// Session state for one `merge_branches` call through to its resolution.
///
/// The enum makes illegal transitions unrepresentable: `resolve_conflict` and
/// `continue_merge` only operate on `ConflictStopped`, and a new session
/// cannot start while one is stopped.
enum MergeSession {
    Idle,
    ConflictStopped {
        branch_id: String,
        branch: String,
        conflict_paths: Vec<String>,
        remaining: Vec<Worktree>,
        config: MergeConfig,
    },
}

enum MergeOutcome {
    Merged(String),
    Conflicted {
        files: Vec<ConflictFile>,
        paths: Vec<String>,
    },
}

/// Drives the sequential merge-back protocol against the base repository.
///
/// All mutating operations hold the session lock for their full duration, so
/// the base repository's index only ever has one writer.
pub struct MergeOrchestrator {
    driver: Arc<dyn GitDriver>,
    repo_root: PathBuf,
    base_branch: String,
    session: Mutex<MergeSession>,
}

impl MergeOrchestrator {
    pub fn new(driver: Arc<dyn GitDriver>, repo_root: impl Into<PathBuf>, base_branch: impl Into<String>) -> Self {
        Self {
            driver,
            repo_root: repo_root.into(),
            base_branch: base_branch.into(),
            session: Mutex::new(MergeSession::Idle),
        }
    }

    /// Merge every registered branch into the base branch, in creation order.
    ///
    /// Stops at the first conflicting branch: its result carries the conflict
    /// records, branches after it are not attempted, and the session waits in
    /// the conflict-stopped state for `resolve_conflict`/`continue_merge` or
    /// `abort_merge`.
    pub async fn merge_branches(
        &self,
        registry: &WorktreeRegistry,
        config: MergeConfig,
    ) -> Result<Vec<MergeResult>, MergeError> {
        let mut session = self.session.lock().await;
        if !matches!(*session, MergeSession::Idle) {
            return Err(MergeError::SessionActive);
        }

        self.ensure_no_stale_merge().await?;

        let mut queue = Vec::new();
        for id in registry.ids_in_creation_order() {
            queue.push(registry.get(&id)?);
        }

        info!(branches = queue.len(), base = %self.base_branch, "Starting merge session");

        let mut results = Vec::new();
        self.process_queue(&mut session, queue, config, &mut results).await?;
        Ok(results)
    }

    /// Write resolved content for a conflicting path and stage it.
    ///
    /// Only valid while a branch is stopped on conflict; does not advance the
    /// session.
    pub async fn resolve_conflict(&self, path: &str, content: &str) -> Result<(), MergeError> {
        let session = self.session.lock().await;

        let MergeSession::ConflictStopped { conflict_paths, .. } = &*session else {
            return Err(MergeError::NoMergeInProgress);
        };
        if !conflict_paths.iter().any(|p| p == path) {
            return Err(MergeError::UnknownConflictPath(path.to_string()));
        }

        tokio::fs::write(self.repo_root.join(path), content).await?;
        self.driver.run_ok(&self.repo_root, &["add", "--", path]).await?;

        debug!(%path, "MergeOrchestrator::resolve_conflict: staged resolution");

        Ok(())
    }

    /// Finalize the stopped branch's merge and resume with the remaining
    /// branches.
    ///
    /// Fails with `UnresolvedConflicts` while any reported path is still
    /// unmerged. Returns the finalized branch's result first, followed by the
    /// results of the branches processed after it (the session may stop again
    /// on a later conflict).
    pub async fn continue_merge(&self, message: &str) -> Result<Vec<MergeResult>, MergeError> {
        let mut session = self.session.lock().await;

        let (branch_snapshot, paths_snapshot) = match &*session {
            MergeSession::ConflictStopped { branch, conflict_paths, .. } => {
                (branch.clone(), conflict_paths.clone())
            }
            MergeSession::Idle => return Err(MergeError::NoMergeInProgress),
        };

        let still_unmerged = self.unmerged_paths().await?;
        let unresolved: Vec<String> = paths_snapshot
            .iter()
            .filter(|p| still_unmerged.contains(p))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            debug!(?unresolved, "MergeOrchestrator::continue_merge: unresolved paths remain");
            return Err(MergeError::UnresolvedConflicts { paths: unresolved });
        }

        let msg = if message.is_empty() {
            default_message(&branch_snapshot)
        } else {
            message.to_string()
        };

        let commit = self.driver.run(&self.repo_root, &["commit", "-m", &msg]).await?;
        if !commit.success && !commit.combined().contains("nothing to commit") {
            // Leave the session stopped; the caller can retry or abort
            return Err(MergeError::Driver {
                branch: branch_snapshot,
                output: commit.combined(),
                abort_succeeded: false,
            });
        }
        let sha = self.head_sha().await?;

        let state = std::mem::replace(&mut *session, MergeSession::Idle);
        let MergeSession::ConflictStopped { branch_id, remaining, config, .. } = state else {
            return Err(MergeError::NoMergeInProgress);
        };

        info!(%branch_id, %sha, "Merge continued after conflict resolution");

        let mut results = vec![MergeResult::merged(branch_id, sha)];
        self.process_queue(&mut session, remaining, config, &mut results).await?;
        Ok(results)
    }

    /// Discard the stopped branch's in-progress merge, leaving the base
    /// branch unchanged for it.
    ///
    /// With `continue_after_abort` set in the session's config, the branches
    /// never reached in this session are then attempted and their results
    /// returned; otherwise the list is empty and the caller decides whether
    /// to start a fresh session.
    pub async fn abort_merge(&self) -> Result<Vec<MergeResult>, MergeError> {
        let mut session = self.session.lock().await;

        let MergeSession::ConflictStopped { branch, .. } = &*session else {
            return Err(MergeError::NoMergeInProgress);
        };
        let branch = branch.clone();

        if !self.abort_in_progress().await {
            return Err(MergeError::Driver {
                branch,
                output: "merge --abort failed".to_string(),
                abort_succeeded: false,
            });
        }

        let state = std::mem::replace(&mut *session, MergeSession::Idle);
        let MergeSession::ConflictStopped { branch_id, remaining, config, .. } = state else {
            return Err(MergeError::NoMergeInProgress);
        };

        info!(%branch_id, "Merge aborted");

        let mut results = Vec::new();
        if config.continue_after_abort {
            debug!(remaining = remaining.len(), "MergeOrchestrator::abort_merge: continuing with unattempted branches");
            self.process_queue(&mut session, remaining, config, &mut results).await?;
        }
        Ok(results)
    }

    /// Branch id currently stopped on conflict, if any
    pub async fn stopped_branch(&self) -> Option<String> {
        let session = self.session.lock().await;
        match &*session {
            MergeSession::ConflictStopped { branch_id, .. } => Some(branch_id.clone()),
            MergeSession::Idle => None,
        }
    }

    /// Abort any stopped merge so the repository is safe to tear down.
    ///
    /// Waits out an in-flight merge call by taking the session lock. Returns
    /// whether the repository was left clean.
    pub(crate) async fn abort_for_cleanup(&self) -> bool {
        let mut session = self.session.lock().await;
        if matches!(*session, MergeSession::Idle) {
            return true;
        }

        let clean = self.abort_in_progress().await;
        if !clean {
            warn!("Failed to abort in-progress merge during cleanup");
        }
        *session = MergeSession::Idle;
        clean
    }

    async fn process_queue(
        &self,
        session: &mut MergeSession,
        queue: Vec<Worktree>,
        config: MergeConfig,
        results: &mut Vec<MergeResult>,
    ) -> Result<(), MergeError> {
        let mut iter = queue.into_iter();

        while let Some(wt) = iter.next() {
            match self.merge_one(&wt, &config).await? {
                MergeOutcome::Merged(sha) => {
                    info!(branch_id = %wt.branch_id, %sha, "Merged branch into base");
                    results.push(MergeResult::merged(wt.branch_id, sha));
                }
                MergeOutcome::Conflicted { files, paths } => {
                    warn!(branch_id = %wt.branch_id, files = paths.len(), "Merge conflict, stopping session");
                    results.push(MergeResult::conflicted(wt.branch_id.clone(), files));
                    *session = MergeSession::ConflictStopped {
                        branch_id: wt.branch_id,
                        branch: wt.branch,
                        conflict_paths: paths,
                        remaining: iter.collect(),
                        config,
                    };
                    return Ok(());
                }
            }
        }

        *session = MergeSession::Idle;
        Ok(())
    }

    async fn merge_one(&self, wt: &Worktree, config: &MergeConfig) -> Result<MergeOutcome, MergeError> {
        debug!(branch_id = %wt.branch_id, branch = %wt.branch, "MergeOrchestrator::merge_one: called");

        if config.auto_commit_worktrees {
            self.auto_commit(wt).await?;
        }

        self.driver.run_ok(&self.repo_root, &["checkout", &self.base_branch]).await?;

        let msg = if config.commit_message.is_empty() {
            default_message(&wt.branch)
        } else {
            config.commit_message.clone()
        };

        // Squash wins over no-fast-forward: a squashed change has no
        // merge-commit ancestry to force
        let output = if config.squash {
            self.driver.run(&self.repo_root, &["merge", "--squash", &wt.branch]).await?
        } else if config.no_fast_forward {
            self.driver
                .run(&self.repo_root, &["merge", "--no-ff", &wt.branch, "-m", &msg])
                .await?
        } else {
            self.driver.run(&self.repo_root, &["merge", &wt.branch, "-m", &msg]).await?
        };

        if !output.success {
            let unmerged = self.unmerged_paths().await?;
            if output.combined().contains("CONFLICT") && !unmerged.is_empty() {
                let files =
                    conflict::extract_conflicts(self.driver.as_ref(), &self.repo_root, &unmerged).await?;
                return Ok(MergeOutcome::Conflicted { files, paths: unmerged });
            }

            // Non-conflict failure: clean up the index before surfacing it
            let abort_succeeded = self.abort_in_progress().await;
            return Err(MergeError::Driver {
                branch: wt.branch.clone(),
                output: output.combined(),
                abort_succeeded,
            });
        }

        if config.squash {
            // --squash stages the changes but records nothing
            let commit = self.driver.run(&self.repo_root, &["commit", "-m", &msg]).await?;
            if !commit.success && !commit.combined().contains("nothing to commit") {
                let abort_succeeded = self.abort_in_progress().await;
                return Err(MergeError::Driver {
                    branch: wt.branch.clone(),
                    output: commit.combined(),
                    abort_succeeded,
                });
            }
        }

        let sha = self.head_sha().await?;
        Ok(MergeOutcome::Merged(sha))
    }

    /// Commit any uncommitted changes left in a worktree so its branch tip
    /// reflects the work
    async fn auto_commit(&self, wt: &Worktree) -> Result<(), MergeError> {
        let status = self.driver.run_ok(&wt.path, &["status", "--porcelain"]).await?;
        if status.stdout.is_empty() {
            return Ok(());
        }

        info!(branch_id = %wt.branch_id, "Auto-committing uncommitted changes in worktree");

        self.driver.run_ok(&wt.path, &["add", "-A"]).await?;

        let commit = self
            .driver
            .run(&wt.path, &["commit", "-m", "WIP: auto-commit before merge"])
            .await?;
        if !commit.success {
            // Might be nothing stageable after all; the merge itself will say
            warn!(branch_id = %wt.branch_id, "Auto-commit failed: {}", commit.stderr);
        }

        Ok(())
    }

    /// Paths git currently reports as unmerged in the base repository
    async fn unmerged_paths(&self) -> Result<Vec<String>, MergeError> {
        let output = self
            .driver
            .run_ok(&self.repo_root, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn head_sha(&self) -> Result<String, MergeError> {
        let output = self.driver.run_ok(&self.repo_root, &["rev-parse", "HEAD"]).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Best-effort discard of whatever merge state is on disk.
    ///
    /// `merge --abort` needs MERGE_HEAD, which a conflicted `--squash` never
    /// writes; `reset --merge` covers that case.
    async fn abort_in_progress(&self) -> bool {
        if let Ok(output) = self.driver.run(&self.repo_root, &["merge", "--abort"]).await {
            if output.success {
                return true;
            }
        }
        match self.driver.run(&self.repo_root, &["reset", "--merge"]).await {
            Ok(output) => output.success,
            Err(_) => false,
        }
    }

    /// Refuse to start on top of a merge left behind by a killed process
    async fn ensure_no_stale_merge(&self) -> Result<(), MergeError> {
        let probe = self
            .driver
            .run(&self.repo_root, &["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await?;
        if probe.success {
            return Err(MergeError::StaleMergeState);
        }
        if !self.unmerged_paths().await?.is_empty() {
            return Err(MergeError::StaleMergeState);
        }
        Ok(())
    }
}

fn default_message(branch: &str) -> String {
    format!("Merge branch '{}'", branch)
}
