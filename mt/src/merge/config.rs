//! Merge configuration

use serde::{Deserialize, Serialize};

/// Options controlling how branches are merged back into the base branch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Message for non-fast-forward merge commits; a per-branch default is
    /// generated when empty
    #[serde(rename = "commit-message")]
    pub commit_message: String,

    /// Force a merge commit even when a fast-forward is possible
    #[serde(rename = "no-fast-forward")]
    pub no_fast_forward: bool,

    /// Collapse a branch's history into a single change before recording it.
    /// Takes precedence over `no_fast_forward`: a squashed change has no
    /// merge-commit ancestry to preserve.
    #[serde(rename = "squash")]
    pub squash: bool,

    /// Stage and commit any uncommitted work left in a worktree before its
    /// branch is merged
    #[serde(rename = "auto-commit-worktrees")]
    pub auto_commit_worktrees: bool,

    /// After `abort_merge`, go on to attempt the branches that were never
    /// reached in the aborted session
    #[serde(rename = "continue-after-abort")]
    pub continue_after_abort: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            commit_message: String::new(),
            no_fast_forward: false,
            squash: false,
            auto_commit_worktrees: true,
            continue_after_abort: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MergeConfig::default();
        assert!(config.commit_message.is_empty());
        assert!(!config.no_fast_forward);
        assert!(!config.squash);
        assert!(config.auto_commit_worktrees);
        assert!(!config.continue_after_abort);
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = "no-fast-forward: true\ncommit-message: merge it\n";
        let config: MergeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.no_fast_forward);
        assert_eq!(config.commit_message, "merge it");
        // Unlisted fields keep their defaults
        assert!(config.auto_commit_worktrees);

        let dumped = serde_yaml::to_string(&config).unwrap();
        assert!(dumped.contains("no-fast-forward: true"));
    }
}
