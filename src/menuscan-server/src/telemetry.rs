//! Tracing setup with file-based logging
//!
//! - JSON formatted logs to file
//! - Console output for development
//! - Size-based rotation (10MB per file) and daily rotation

use anyhow::Result;
use rolling_file::{RollingConditionBasic, RollingFileAppender};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "menuscan_server=debug,menuscan_core=debug,actix_web=info,mongodb=warn";

/// Initialize tracing with file logging
///
/// Returns a guard that must be kept alive to ensure logs are flushed
pub fn init_telemetry(log_dir: &Path) -> Result<WorkerGuard> {
    // Log directory is created on first start
    std::fs::create_dir_all(log_dir)?;

    // Rotates when the file reaches 10MB or daily, whichever comes first
    // Format: menuscan.log.YYYY-MM-DD
    let file_appender = RollingFileAppender::new(
        log_dir.join("menuscan.log"),
        RollingConditionBasic::new()
            .daily()
            .max_size(10 * 1024 * 1024), // 10 MB
        9, // Keep up to 10 files per day (0-9)
    )?;

    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the default; driver chatter stays at warn
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // JSON file layer; closed spans carry handler and install timings
    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true);

    // Console layer for human-readable output
    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    // Combine all layers
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!("Telemetry initialized with file logging to {:?}", log_dir);
    tracing::info!("Log rotation: 10MB per file, daily rotation, format: menuscan.log.YYYY-MM-DD");

    Ok(guard)
}
