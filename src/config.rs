//! Engine configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backoff::ExponentialBackoff;

/// Configuration for the rollup runtime and query tools
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding per-chain event and rollup databases
    pub data_dir: PathBuf,

    /// Chain registry file (JSON array of chain configs)
    pub chains_path: PathBuf,

    /// Scheduler tick in milliseconds
    pub advance_interval_ms: u64,

    /// Max events applied per `advance` call
    pub advance_batch_size: usize,

    /// Widest window a chain-pair breakdown may scan
    pub max_pair_range_days: i64,

    pub query_retry_initial_ms: u64,
    pub query_retry_max_ms: u64,
    pub query_max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            chains_path: PathBuf::from("chains.json"),
            advance_interval_ms: 1_000,
            advance_batch_size: 5_000,
            max_pair_range_days: 366,
            query_retry_initial_ms: 50,
            query_retry_max_ms: 1_000,
            query_max_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CHAINPULSE_DATA_DIR` (default: data)
    /// - `CHAINPULSE_CHAINS_PATH` (default: chains.json)
    /// - `ADVANCE_INTERVAL_MS` (default: 1000)
    /// - `ADVANCE_BATCH_SIZE` (default: 5000)
    /// - `MAX_PAIR_RANGE_DAYS` (default: 366)
    /// - `QUERY_RETRY_INITIAL_MS` (default: 50)
    /// - `QUERY_RETRY_MAX_MS` (default: 1000)
    /// - `QUERY_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            data_dir: env::var("CHAINPULSE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),

            chains_path: env::var("CHAINPULSE_CHAINS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.chains_path),

            advance_interval_ms: env_or("ADVANCE_INTERVAL_MS", defaults.advance_interval_ms),

            advance_batch_size: env_or("ADVANCE_BATCH_SIZE", defaults.advance_batch_size).max(1),

            max_pair_range_days: env_or("MAX_PAIR_RANGE_DAYS", defaults.max_pair_range_days),

            query_retry_initial_ms: env_or("QUERY_RETRY_INITIAL_MS", defaults.query_retry_initial_ms),

            query_retry_max_ms: env_or("QUERY_RETRY_MAX_MS", defaults.query_retry_max_ms),

            query_max_retries: env_or("QUERY_MAX_RETRIES", defaults.query_max_retries),
        }
    }

    /// Fresh backoff for one retried query
    pub fn query_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            self.query_retry_initial_ms,
            self.query_retry_max_ms,
            self.query_max_retries,
        )
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Defaults first, then overrides; kept in one test since env is process-wide
        for key in [
            "CHAINPULSE_DATA_DIR",
            "CHAINPULSE_CHAINS_PATH",
            "ADVANCE_INTERVAL_MS",
            "ADVANCE_BATCH_SIZE",
            "MAX_PAIR_RANGE_DAYS",
        ] {
            env::remove_var(key);
        }

        let config = EngineConfig::from_env();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.chains_path, PathBuf::from("chains.json"));
        assert_eq!(config.advance_interval_ms, 1_000);
        assert_eq!(config.advance_batch_size, 5_000);
        assert_eq!(config.max_pair_range_days, 366);

        env::set_var("CHAINPULSE_DATA_DIR", "/tmp/chainpulse");
        env::set_var("ADVANCE_BATCH_SIZE", "250");
        env::set_var("MAX_PAIR_RANGE_DAYS", "not-a-number");

        let config = EngineConfig::from_env();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/chainpulse"));
        assert_eq!(config.advance_batch_size, 250);
        assert_eq!(config.max_pair_range_days, 366);

        env::remove_var("CHAINPULSE_DATA_DIR");
        env::remove_var("ADVANCE_BATCH_SIZE");
        env::remove_var("MAX_PAIR_RANGE_DAYS");
    }
}
