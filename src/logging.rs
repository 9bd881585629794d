//! Tracing subscriber setup.

use crate::config::{Config, LogFormat};
use crate::error::{AppError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// Logs go to stderr, or to a daily rolling file under `LOG_DIR`, so stdout stays free for
/// command output.
///
/// The returned guard flushes the file writer on drop and must be held for the lifetime of
/// the process when `LOG_DIR` is configured.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let (writer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "ecolviv-pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        },
        None => (None, None),
    };

    let installed = match (config.log_format, writer) {
        (LogFormat::Json, Some(w)) => builder.json().with_writer(w).with_ansi(false).try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, Some(w)) => builder.with_writer(w).with_ansi(false).try_init(),
        (LogFormat::Pretty, None) => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| AppError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(guard)
}
