//! # Substrate Service Process
//!
//! Loads configuration, initialises logging, bootstraps the substrate inside
//! the fault boundary and runs until Ctrl+C, then shuts down in reverse
//! dependency order.
//!
//! The configuration directory defaults to `config/` and can be overridden
//! with `SUBSTRATE_CONFIG_DIR`.

use std::path::PathBuf;
use std::process;
use substrate_core::config::ConfigManager;
use substrate_core::constants::system::FATAL_EXIT_CODE;
use substrate_core::logging::init_structured_logging;
use substrate_core::orchestration::SubstrateCore;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::var("SUBSTRATE_CONFIG_DIR").ok().map(PathBuf::from);
    let config_manager = ConfigManager::load_from_directory(config_dir)?;
    init_structured_logging(&config_manager.config().logging)?;

    info!(
        environment = config_manager.environment(),
        version = env!("CARGO_PKG_VERSION"),
        "🚀 Starting substrate"
    );

    let core = SubstrateCore::from_config_manager(&config_manager)?;
    let Some(report) = core.run().await else {
        // Reached only when the fatal-fault terminator returned
        error!("❌ Bootstrap failed, exiting");
        core.shutdown().await;
        process::exit(FATAL_EXIT_CODE);
    };

    info!(
        services = report.order.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        degraded = ?report.degraded(),
        "✅ Substrate running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown signal received");
    core.shutdown().await;
    Ok(())
}
