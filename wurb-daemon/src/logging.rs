//! Console and rolling file logging

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

pub const LOG_FILE_PREFIX: &str = "wurb_log";
pub const LOG_FILE_SUFFIX: &str = "txt";

/// Keeps the file writer thread alive. Dropping it flushes pending lines.
pub struct LogHandle {
    pub log_dir: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

/// `wurb_log.<date>.txt` in `dir`, keeping at most `max_files` of them.
pub fn rolling_appender(
    dir: &Path,
    rotation: Rotation,
    max_files: usize,
) -> Result<RollingFileAppender> {
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX);
    if max_files > 0 {
        builder = builder.max_log_files(max_files);
    }
    builder
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig, log_dir: Option<&Path>) -> Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let console = fmt::layer().with_target(false).compact();

    let (file_layer, guard, dir) = match log_dir {
        Some(dir) if config.log_to_file => {
            wurb_paths::ensure_dir(dir, false)?;
            let appender = rolling_appender(dir, config.rotation()?, config.max_files)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard), Some(dir.to_path_buf()))
        }
        _ => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogHandle {
        log_dir: dir,
        _guard: guard,
    })
}
