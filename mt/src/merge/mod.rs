//! Sequential merge-back of worktree branches into the base branch
//!
//! Branches merge one at a time against the single shared base repository.
//! A conflicting merge suspends the session instead of failing it: the
//! orchestrator reports structured [`ConflictFile`] records and waits for
//! `resolve_conflict` / `continue_merge` (or `abort_merge`) before touching
//! the next branch.

mod config;
mod conflict;
mod orchestrator;

use crate::git::GitError;
use crate::worktree::WorktreeError;

pub use config::MergeConfig;
pub use conflict::{BlobContent, ConflictFile, ConflictMarker, parse_markers};
pub use orchestrator::{MergeOrchestrator, MergeResult};

/// Error types for merge operations.
///
/// Conflicts are never reported through this enum; they come back as data in
/// [`MergeResult::conflicts`].
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("A merge session is already stopped on a conflict")]
    SessionActive,

    #[error("No merge is in progress")]
    NoMergeInProgress,

    #[error("Unresolved conflicts remain: {paths:?}")]
    UnresolvedConflicts { paths: Vec<String> },

    #[error("Path was not reported as conflicting: {0}")]
    UnknownConflictPath(String),

    #[error("The base repository has a merge in progress from an earlier session")]
    StaleMergeState,

    #[error("Merge of {branch} failed (cleanup succeeded: {abort_succeeded}): {output}")]
    Driver {
        branch: String,
        output: String,
        abort_succeeded: bool,
    },

    #[error("Worktree error: {0}")]
    Worktree(#[from] WorktreeError),

    #[error("Git command failed: {0}")]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
