//! Git command execution
//!
//! Everything that touches a repository goes through the [`GitDriver`] trait,
//! so tests can substitute a scripted double for the real `git` binary.

mod context;
mod driver;

pub use context::GitContext;
pub use driver::{CliGitDriver, GitDriver, GitError, GitOutput};
