//! Project management
//!
//! Handles project initialization and provides access to the board.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::config::BOARD_DIR;
use super::{BoardStore, Config};
use crate::domain::{Snapshot, TaskScheduler};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a taskboard project. Run 'taskboard init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# Taskboard configuration

# What 'task start' does when a resource would go over capacity:
# "advisory" starts anyway and reports contention, "strict" refuses.
contention_policy = "advisory"

# Defaults for 'task add'
default_priority = "medium"
default_duration_minutes = 60
"#;

const GITIGNORE: &str = r#"# Ignore temp files left by interrupted writes
*.tmp
"#;

/// A taskboard project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(BOARD_DIR).is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Existing files are left untouched, so running it twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let board_dir = root.join(BOARD_DIR);

        fs::create_dir_all(&board_dir).with_context(|| {
            format!("Failed to create {} directory: {}", BOARD_DIR, board_dir.display())
        })?;

        let config_path = board_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = board_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .taskboard directory path
    pub fn board_dir(&self) -> PathBuf {
        self.root.join(BOARD_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the board store
    pub fn store(&self) -> BoardStore {
        BoardStore::for_project(&self.root)
    }

    /// Loads the board into a scheduler using the project's contention policy
    pub fn load_scheduler(&self) -> Result<TaskScheduler> {
        let snapshot = self.store().load()?;
        debug!(policy = ?self.config.project.contention_policy, "restoring scheduler");
        TaskScheduler::restore(snapshot, self.config.project.contention_policy)
            .context("Stored board is inconsistent")
    }

    /// Persists the scheduler's current state
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        self.store().save(snapshot)
    }
}
