//! Logging facade used throughout the crate.
//!
//! Backed by `tracing`; the file layer writes daily-rolling logs into the
//! data directory so host apps and headless runs share one setup.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::modules::config;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initializes the global subscriber once; later calls are no-ops.
pub fn init_logging() -> Result<(), String> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let log_dir = config::data_dir().join("logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| format!("Failed to create log directory: {}", e))?;

    let appender = tracing_appender::rolling::daily(&log_dir, "mira-accounts.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::get_config().log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to install log subscriber: {}", e))?;

    // Route log-crate records from dependencies into tracing.
    let _ = tracing_log::LogTracer::init();

    let _ = LOG_GUARD.set(guard);
    Ok(())
}

pub fn log_debug(message: &str) {
    tracing::debug!("{}", message);
}

pub fn log_info(message: &str) {
    tracing::info!("{}", message);
}

pub fn log_warn(message: &str) {
    tracing::warn!("{}", message);
}

pub fn log_error(message: &str) {
    tracing::error!("{}", message);
}
