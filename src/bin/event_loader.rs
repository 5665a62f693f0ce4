//! Event Loader - appends JSONL events into a chain's event log
//!
//! ## Usage
//!
//! ```bash
//! event_loader --chain 43114 --file events.jsonl [--advance]
//! ```
//!
//! Invalid lines are logged and skipped. With `--advance` the chain's rollups
//! are brought up to date after loading.

use chainpulse::catalog::events_db_path;
use chainpulse::event_log::{parse_jsonl_event, SqliteEventLog};
use chainpulse::{Aggregator, ChainCatalog, ChainRegistry, EngineConfig, StaticChainRegistry};
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

#[derive(Debug)]
struct LoaderConfig {
    chain_id: u64,
    file: String,
    advance: bool,
}

impl LoaderConfig {
    fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = env::args().collect();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
                .cloned()
        };

        let chain_id = value_of("--chain")
            .ok_or("missing --chain <id>")?
            .parse()?;
        let file = value_of("--file").ok_or("missing --file <events.jsonl>")?;

        Ok(Self {
            chain_id,
            file,
            advance: args.iter().any(|a| a == "--advance"),
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let loader = LoaderConfig::from_args()?;
    let config = EngineConfig::from_env();
    let registry = Arc::new(StaticChainRegistry::load(&config.chains_path)?);

    if !registry.contains(loader.chain_id) {
        return Err(format!("chain {} not in {}", loader.chain_id, config.chains_path.display()).into());
    }

    log::info!("📥 Loading {} into chain {}", loader.file, loader.chain_id);

    let event_log = SqliteEventLog::open(loader.chain_id, events_db_path(&config.data_dir, loader.chain_id))?;
    let reader = BufReader::new(File::open(&loader.file)?);

    let mut appended = 0u64;
    let mut rejected = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let result = parse_jsonl_event(&line).and_then(|event| event_log.append(&event));
        match result {
            Ok(_) => appended += 1,
            Err(e) => {
                rejected += 1;
                log::warn!("⚠️  Line {}: {}", line_no + 1, e);
            }
        }
    }

    log::info!("✅ Appended {} events ({} rejected)", appended, rejected);
    log::info!("   └─ Log now holds {} events", event_log.event_count()?);
    drop(event_log);

    if loader.advance {
        let catalog = Arc::new(ChainCatalog::open(registry, &config.data_dir)?);
        let aggregator = Aggregator::new(catalog, config.advance_batch_size);
        let report = aggregator.advance_until_caught_up(loader.chain_id)?;
        log::info!(
            "📈 Rollups advanced by {} events (cursor #{})",
            report.events_applied,
            report.cursor.last_event_id
        );
    }

    Ok(())
}
