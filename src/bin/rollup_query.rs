//! Rollup Query - prints dashboard query results as JSON
//!
//! ## Usage
//!
//! ```bash
//! rollup_query cumulative --chain 43114 [--metric tx|gas] [--at <ts>]
//! rollup_query range      --chain 43114 --metric tx|gas|addresses --from <ts> --to <ts>
//! rollup_query daily      --chain 43114 --days 30
//! rollup_query pairs      --chain 43114 --from <ts> --to <ts>
//! ```
//!
//! Reads CHAINPULSE_DATA_DIR and CHAINPULSE_CHAINS_PATH like the runtime.

use chainpulse::types::{Metric, TimeRange};
use chainpulse::{AnalyticsService, ChainCatalog, EngineConfig, StaticChainRegistry};
use std::env;
use std::sync::Arc;

const USAGE: &str = "usage: rollup_query <cumulative|range|daily|pairs> --chain <id> \
[--metric <tx|gas|addresses>] [--at <ts>] [--from <ts>] [--to <ts>] [--days <n>]";

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1))
        .map(|s| s.as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str, Box<dyn std::error::Error>> {
    arg_value(args, flag).ok_or_else(|| format!("missing {}\n{}", flag, USAGE).into())
}

fn parse_metric(args: &[String], default: Metric) -> Result<Metric, Box<dyn std::error::Error>> {
    match arg_value(args, "--metric") {
        Some(raw) => Ok(raw.parse::<Metric>()?),
        None => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).ok_or(USAGE)?.clone();
    let chain_id: u64 = required(&args, "--chain")?.parse()?;

    let config = EngineConfig::from_env();
    let registry = Arc::new(StaticChainRegistry::load(&config.chains_path)?);
    let catalog = Arc::new(ChainCatalog::open(registry, &config.data_dir)?);
    let service = AnalyticsService::new(catalog, config);

    let output = match command.as_str() {
        "cumulative" => {
            let metric = parse_metric(&args, Metric::TxCount)?;
            let at = arg_value(&args, "--at").map(str::parse::<i64>).transpose()?;
            serde_json::to_string_pretty(&service.cumulative_as_of(chain_id, metric, at).await?)?
        }
        "range" => {
            let metric = parse_metric(&args, Metric::TxCount)?;
            let range = TimeRange::parse(required(&args, "--from")?, required(&args, "--to")?)?;
            serde_json::to_string_pretty(&service.range_total(chain_id, metric, range).await?)?
        }
        "daily" => {
            let days: u32 = arg_value(&args, "--days").unwrap_or("30").parse()?;
            serde_json::to_string_pretty(&service.daily_series(chain_id, days).await?)?
        }
        "pairs" => {
            let range = TimeRange::parse(required(&args, "--from")?, required(&args, "--to")?)?;
            serde_json::to_string_pretty(&service.chain_pair_breakdown(chain_id, range).await?)?
        }
        other => return Err(format!("unknown command '{}'\n{}", other, USAGE).into()),
    };

    println!("{}", output);
    Ok(())
}
