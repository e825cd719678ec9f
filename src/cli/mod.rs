//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Board setup | `init`, `status` |
//! | Task | Task lifecycle | `task add`, `task start`, `task done` |
//! | Resource | Shared capacity | `resource add`, `resource contenders` |
//! | Query | Derived state | `view`, `conflicts`, `schedule`, `ready`, `blocked` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Mutating commands also report conflicts their change introduced.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output on stderr:
//! ```bash
//! taskboard --verbose ready
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod board;
mod output;
mod query;
mod resource;
mod task;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
