//! Logging infrastructure for the custody pipeline
//!
//! Diagnostics go to the terminal and to rotating files in the app data
//! directory. The audit trail is separate: it is a domain record kept by
//! [`crate::audit::AuditLog`], and its entries also pass through here under
//! the `audit` target.
//!
//! ## Targets
//!
//! - **Terminal**: stderr, so console output on stdout stays readable
//! - **`eo-custody.<date>.log`**: every level allowed by the filter
//! - **`error.<date>.log`**: warnings and errors only
//!
//! Files rotate daily and the last 10 are kept. `RUST_LOG` overrides the
//! default `info` filter.
//!
//! ## Usage
//!
//! ```no_run
//! use eo_custody::logging;
//!
//! logging::init(false).expect("Failed to initialize logging");
//! tracing::info!("Pipeline started");
//! ```

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "eo-custody";

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/eo-custody/logs`
/// - macOS: `~/Library/Application Support/eo-custody/logs`
/// - Linux: `~/.local/share/eo-custody/logs`
///
/// # Errors
///
/// Returns error if the data directory is unknown or cannot be created.
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    let log_dir = base_dir.join(APP_DIR).join("logs");

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

/// Initializes terminal and file logging.
///
/// With `quiet` set the terminal only shows warnings and errors; the files
/// are unaffected.
///
/// # Errors
///
/// Returns error if log directory cannot be created or file appenders fail
pub fn init(quiet: bool) -> Result<()> {
    let log_dir = get_log_dir()?;

    let all_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(APP_DIR)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create all-logs file appender")?;

    let error_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("error")
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create error-logs file appender")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    let terminal_filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("trace")
    };

    let terminal_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(terminal_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("A global subscriber is already installed")?;

    tracing::debug!("Logging initialized, log directory: {}", log_dir.display());

    Ok(())
}

/// Gets the path to today's log file
///
/// # Errors
///
/// See [`get_log_dir`].
pub fn get_current_log_path() -> Result<PathBuf> {
    let log_dir = get_log_dir()?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{APP_DIR}.{today}.log")))
}
