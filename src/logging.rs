//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, a JSON
//! log file per process.

use crate::config::{ConfigManager, LoggingConfig};
use chrono::Utc;
use std::fs;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the file writer flushing for the life of the process
static FILE_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging.
///
/// Only the first call installs a subscriber; later calls, or a subscriber
/// installed by an embedding process, leave the existing one in place.
pub fn init_structured_logging(config: &LoggingConfig) -> std::io::Result<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    let environment = ConfigManager::detect_environment();
    let directive = resolve_directive(config, &environment);

    let console = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(EnvFilter::new(&directive))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(&directive))
            .boxed()
    };

    let (file_layer, guard, log_path) = match &config.directory {
        Some(directory) => {
            fs::create_dir_all(directory)?;
            let file_name = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            let appender = tracing_appender::rolling::never(directory, &file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new(&directive));
            (Some(layer), Some(guard), Some(directory.join(file_name)))
        }
        None => (None, None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .is_ok();

    // Losing the race to another initializer just drops our guard
    let _ = FILE_GUARD.set(guard);

    if installed {
        tracing::info!(
            pid = process::id(),
            environment = %environment,
            filter = %directive,
            log_file = ?log_path,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    } else {
        tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
    }
    Ok(())
}

/// Configured directive, then `RUST_LOG`, then the environment default
fn resolve_directive(config: &LoggingConfig, environment: &str) -> String {
    config
        .level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| default_level(environment).to_string())
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}
