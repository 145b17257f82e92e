//! Git worktree provisioning
//!
//! Each line of work executes in its own git worktree on a dedicated branch,
//! enabling parallel work without file conflicts. The registry tracks every
//! provisioned worktree by its caller-chosen branch id.

mod registry;

pub use registry::{Worktree, WorktreeError, WorktreeRegistry, sanitize_branch_id};
