//! # Storage Layer
//!
//! Persistence for the task board with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Tasks | JSONL (one JSON per line) | `.taskboard/tasks.jsonl` |
//! | Resources | JSONL (one JSON per line) | `.taskboard/resources.jsonl` |
//! | Config | TOML | `.taskboard/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`BoardStore`] uses file locking (`fs2`) for concurrent access
//! - All writes are atomic (temp file + rename)
//!
//! ## Project Structure
//!
//! ```text
//! .taskboard/
//! ├── tasks.jsonl           # All tasks
//! ├── resources.jsonl       # Declared resources and capacities
//! ├── config.toml           # Project configuration
//! └── .gitignore            # Ignores temp files
//! ```

mod config;
mod jsonl;
mod project;

pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig, BOARD_DIR};
pub use jsonl::BoardStore;
pub use project::{Project, ProjectError};
