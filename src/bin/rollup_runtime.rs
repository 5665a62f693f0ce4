//! Rollup Runtime - keeps every chain's rollups caught up with its event log
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin rollup_runtime
//! ```
//!
//! ## Environment Variables
//!
//! - CHAINPULSE_DATA_DIR - Per-chain database directory (default: data)
//! - CHAINPULSE_CHAINS_PATH - Chain registry JSON (default: chains.json)
//! - ADVANCE_INTERVAL_MS - Scheduler tick (default: 1000)
//! - ADVANCE_BATCH_SIZE - Max events per advance (default: 5000)
//! - RUST_LOG - Logging level (optional, default: info)

use chainpulse::scheduler::spawn_chain_advancers;
use chainpulse::{Aggregator, ChainCatalog, EngineConfig, LogAlert, OperatorAlert, StaticChainRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = EngineConfig::from_env();

    log::info!("🚀 Starting Rollup Runtime");
    log::info!("   ├─ Data dir: {}", config.data_dir.display());
    log::info!("   ├─ Chain registry: {}", config.chains_path.display());
    log::info!("   ├─ Advance interval: {}ms", config.advance_interval_ms);
    log::info!("   └─ Batch size: {} events", config.advance_batch_size);

    let registry = Arc::new(StaticChainRegistry::load(&config.chains_path)?);
    if registry.is_empty() {
        log::warn!("⚠️  Chain registry is empty, nothing to advance");
        return Ok(());
    }

    let catalog = Arc::new(ChainCatalog::open(registry, &config.data_dir)?);
    for chain_id in catalog.chain_ids() {
        let handle = catalog.handle(chain_id)?;
        let cursor = handle.rollups().cursor()?;
        log::info!(
            "   ├─ {} ({}): resuming after event #{}",
            handle.config().chain_name,
            chain_id,
            cursor.last_event_id
        );
    }

    let aggregator = Arc::new(Aggregator::new(catalog, config.advance_batch_size));
    let alerts: Arc<dyn OperatorAlert> = Arc::new(LogAlert);

    let handles = spawn_chain_advancers(aggregator, alerts, config.advance_interval_ms);
    log::info!("✅ {} chain advancers running", handles.len());

    tokio::signal::ctrl_c().await?;
    log::info!("🛑 Shutdown requested, stopping advancers");

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
