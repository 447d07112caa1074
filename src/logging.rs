use anyhow::{Context, Result};
use flexi_logger::{Logger, LoggerHandle};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Start logging to stderr. `RUST_LOG` takes precedence over `level`.
///
/// Keep the returned handle alive for as long as log output is wanted.
pub fn init_logging(level: Option<&str>) -> Result<LoggerHandle> {
    let filter = level.unwrap_or(DEFAULT_LOG_LEVEL);
    Logger::try_with_env_or_str(filter)
        .with_context(|| format!("Invalid log level `{}`", filter))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .context("Failed to start logger")
}
