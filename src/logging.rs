//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--verbose` CLI flag (debug)
//! 2. `TASKBOARD_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `warn`
//!
//! Logs go to stderr so that stdout stays clean for command output.

use tracing::Level;

pub const LOG_ENV: &str = "TASKBOARD_LOG";

/// Initialise the global logging subscriber.
///
/// Calling it again is a no-op.
pub fn init_logging(verbose: bool) {
    let level = resolve_level(verbose, std::env::var(LOG_ENV).ok().as_deref());

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_level(verbose: bool, env: Option<&str>) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    env.and_then(parse_level_str).unwrap_or(Level::WARN)
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
