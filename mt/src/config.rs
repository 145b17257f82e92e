//! Mergetree configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::merge::MergeConfig;

/// Main mergetree configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worktree provisioning settings
    pub worktree: WorktreeSettings,

    /// Default merge options
    pub merge: MergeConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early so misconfiguration fails fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        if self.worktree.branch_prefix.is_empty() {
            return Err(eyre::eyre!("worktree.branch-prefix must not be empty"));
        }
        if self.worktree.branch_prefix.chars().any(char::is_whitespace) {
            return Err(eyre::eyre!(
                "worktree.branch-prefix must not contain whitespace: {:?}",
                self.worktree.branch_prefix
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .mergetree.yml
        let local_config = PathBuf::from(".mergetree.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/mergetree/mergetree.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mergetree").join("mergetree.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Worktree provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeSettings {
    /// Base directory for worktrees
    #[serde(rename = "root-dir")]
    pub root_dir: PathBuf,

    /// Branch prefix for generated branch names
    #[serde(rename = "branch-prefix")]
    pub branch_prefix: String,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/tmp/mergetree/worktrees"),
            branch_prefix: "mergetree".to_string(),
        }
    }
}

impl WorktreeSettings {
    /// Conventional branch name for a branch id
    pub fn branch_name_for(&self, branch_id: &str) -> String {
        format!("{}/{}", self.branch_prefix, branch_id)
    }
}
