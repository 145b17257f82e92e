//! Mergetree - Parallel git worktree coordination
//!
//! Mergetree coordinates multiple isolated working copies of a single git
//! repository so that independent lines of work (for example automated agents
//! each producing a branch) can proceed concurrently, then be merged back
//! into a common base branch with explicit, resumable conflict handling.
//!
//! # Core Concepts
//!
//! - **Isolation by Worktree**: every line of work gets its own checkout on
//!   its own branch; nothing shares a working tree
//! - **Serialized Merge-Back**: branches land on the base branch one at a
//!   time, so later branches merge against the result of earlier ones
//! - **Conflicts Are Data**: a conflicting merge suspends the session and
//!   reports structured records instead of raising errors
//! - **Resume, Don't Restart**: resolve the reported paths, then continue the
//!   same session where it stopped
//!
//! # Modules
//!
//! - [`git`] - Repository driver trait and the git CLI implementation
//! - [`worktree`] - Worktree provisioning and registry
//! - [`merge`] - Merge orchestration, session state, conflict extraction
//! - [`manager`] - Facade binding one base repository and one worktree root
//! - [`config`] - Configuration types and loading

pub mod config;
pub mod git;
pub mod manager;
pub mod merge;
pub mod worktree;

// Re-export commonly used types
pub use config::{Config, WorktreeSettings};
pub use git::{CliGitDriver, GitContext, GitDriver, GitError, GitOutput};
pub use manager::{Manager, ManagerError};
pub use merge::{
    BlobContent, ConflictFile, ConflictMarker, MergeConfig, MergeError, MergeOrchestrator, MergeResult,
    parse_markers,
};
pub use worktree::{Worktree, WorktreeError, WorktreeRegistry};
