//! Per-chain advance loops
//!
//! One tokio task per chain. Each tick runs a single bounded `advance` on
//! the blocking pool, so chains progress independently and a slow or halted
//! chain never holds up the others.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::aggregator::{Aggregator, OperatorAlert};

/// Spawn an advance loop for every chain in the aggregator's catalog
pub fn spawn_chain_advancers(
    aggregator: Arc<Aggregator>,
    alerts: Arc<dyn OperatorAlert>,
    interval_ms: u64,
) -> Vec<JoinHandle<()>> {
    aggregator
        .catalog()
        .chain_ids()
        .into_iter()
        .map(|chain_id| {
            tokio::spawn(chain_advance_task(
                aggregator.clone(),
                alerts.clone(),
                chain_id,
                interval_ms,
            ))
        })
        .collect()
}

/// Advance one chain every `interval_ms` until it halts
///
/// A halted chain stops its task; storage errors are reported and retried
/// on the next tick.
pub async fn chain_advance_task(
    aggregator: Arc<Aggregator>,
    alerts: Arc<dyn OperatorAlert>,
    chain_id: u64,
    interval_ms: u64,
) {
    log::info!("⏰ Starting advancer for chain {} (interval: {}ms)", chain_id, interval_ms);

    let mut timer = interval(Duration::from_millis(interval_ms.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let agg = aggregator.clone();
        let result = tokio::task::spawn_blocking(move || agg.advance(chain_id)).await;

        match result {
            Ok(Ok(report)) => {
                if report.events_applied > 0 {
                    log::debug!(
                        "✅ Chain {} advanced {} events (cursor #{})",
                        chain_id,
                        report.events_applied,
                        report.cursor.last_event_id
                    );
                }
            }
            Ok(Err(err)) if aggregator.is_halted(chain_id).unwrap_or(false) => {
                alerts.chain_halted(chain_id, &err).await;
                log::error!("🛑 Advancer for chain {} stopped", chain_id);
                return;
            }
            Ok(Err(err)) if err.is_retryable() => {
                alerts.storage_degraded(chain_id, &err).await;
            }
            Ok(Err(err)) => {
                log::error!("❌ Chain {} advance failed: {}", chain_id, err);
            }
            Err(join_err) => {
                log::error!("❌ Advance task for chain {} panicked: {}", chain_id, join_err);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{events_db_path, ChainCatalog};
    use crate::error::CoreError;
    use crate::event_log::SqliteEventLog;
    use crate::registry::StaticChainRegistry;
    use crate::types::{ChainConfig, Event};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingAlert {
        halted: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl OperatorAlert for RecordingAlert {
        async fn chain_halted(&self, chain_id: u64, _error: &CoreError) {
            self.halted.lock().unwrap().push(chain_id);
        }

        async fn storage_degraded(&self, _chain_id: u64, _error: &CoreError) {}
    }

    fn chain(id: u64) -> ChainConfig {
        ChainConfig {
            evm_chain_id: id,
            chain_name: format!("chain-{}", id),
            blockchain_id: format!("bc-{}", id),
        }
    }

    #[tokio::test]
    async fn test_halted_chain_does_not_stop_others() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(StaticChainRegistry::new(vec![chain(1), chain(2)]));
        let catalog = Arc::new(ChainCatalog::open(registry, dir.path()).unwrap());

        // Chain 1 gets an out-of-order pair, chain 2 a clean stream
        let log1 = SqliteEventLog::open(1, events_db_path(dir.path(), 1)).unwrap();
        log1.append(&Event::tx(1, 1700000100, 0, 21_000)).unwrap();
        log1.append(&Event::tx(1, 1700000000, 0, 21_000)).unwrap();

        let log2 = SqliteEventLog::open(2, events_db_path(dir.path(), 2)).unwrap();
        log2.append(&Event::tx(2, 1700000100, 0, 21_000)).unwrap();
        log2.append(&Event::tx(2, 1700000101, 0, 21_000)).unwrap();

        let aggregator = Arc::new(Aggregator::new(catalog.clone(), 100));
        let alerts = Arc::new(RecordingAlert::default());
        let handles = spawn_chain_advancers(aggregator.clone(), alerts.clone(), 10);
        assert_eq!(handles.len(), 2);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(*alerts.halted.lock().unwrap(), vec![1]);
        assert!(aggregator.is_halted(1).unwrap());
        assert!(!aggregator.is_halted(2).unwrap());
        assert!(handles[0].is_finished());

        let chain2 = catalog.handle(2).unwrap();
        assert_eq!(chain2.rollups().latest_cumulative().unwrap().cumulative_tx_count, 2);

        // Nothing from the bad batch reached chain 1's rollups
        let chain1 = catalog.handle(1).unwrap();
        assert!(chain1.rollups().cursor().unwrap().is_genesis());

        for handle in handles {
            handle.abort();
        }
    }
}
