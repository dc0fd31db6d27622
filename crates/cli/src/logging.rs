// Logging setup
// Console goes to stderr (stdout is for results); RUST_LOG overrides the default filter.
// DOORSTOP_HARNESS_LOG_FORMAT=json switches the console to JSON lines.
// With `log_dir` set, a daily-rolling JSON file is written as well.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "DOORSTOP_HARNESS_LOG_FORMAT";
const DEFAULT_FILTER: &str = "doorstop_harness=info";
const LOG_FILE_PREFIX: &str = "doorstop-harness.log";

/// Install the global subscriber; keep the guard alive until exit or file logs are lost
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if verbose { "doorstop_harness=debug" } else { DEFAULT_FILTER }))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let json_console = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    if json_console {
        // Production: JSON structured logging
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        // Development: compact human-readable lines
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(guard)
}
