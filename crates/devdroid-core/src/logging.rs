//! Logging configuration using tracing
//!
//! Progress markers go to stderr so they interleave with the output of the
//! child processes we inherit stdio to. A rolling file log keeps full detail.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Initialize the logging subsystem
///
/// Detailed logs are written to `~/.local/share/devdroid/logs/`.
/// Log level is controlled by the `DEVDROID_LOG` environment variable.
///
/// # Examples
/// ```bash
/// DEVDROID_LOG=debug devdroid
/// DEVDROID_LOG=trace devdroid
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "devdroid.log");

    // Default to info, allow override via DEVDROID_LOG
    let env_filter = EnvFilter::try_from_env("DEVDROID_LOG")
        .unwrap_or_else(|_| EnvFilter::new("devdroid=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::ChronoLocal::new("%H:%M:%S".to_string())),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::debug!("Log directory: {}", log_dir.display());

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("devdroid").join("logs"))
}
