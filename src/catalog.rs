//! Chain catalog: typed map from chain ID to its storage handles
//!
//! Resolved once at startup from the chain registry. Every lookup checks the
//! registry first, so an unknown chain fails with `ChainNotFound` before any
//! storage is touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CoreError;
use crate::event_log::{EventSource, SqliteEventLog};
use crate::registry::ChainRegistry;
use crate::rollup::RollupStore;
use crate::types::ChainConfig;

pub fn events_db_path(data_dir: &Path, chain_id: u64) -> PathBuf {
    data_dir.join(format!("chain_{}_events.db", chain_id))
}

pub fn rollups_db_path(data_dir: &Path, chain_id: u64) -> PathBuf {
    data_dir.join(format!("chain_{}_rollups.db", chain_id))
}

/// Per-chain storage: event log, rollup store and the advance lock
pub struct ChainHandle {
    config: ChainConfig,
    events: Arc<dyn EventSource>,
    rollups: RollupStore,
    advance_lock: Mutex<()>,
}

impl ChainHandle {
    pub fn new(config: ChainConfig, events: Arc<dyn EventSource>, rollups: RollupStore) -> Self {
        Self {
            config,
            events,
            rollups,
            advance_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.evm_chain_id
    }

    pub fn events(&self) -> &dyn EventSource {
        self.events.as_ref()
    }

    pub fn rollups(&self) -> &RollupStore {
        &self.rollups
    }

    /// Held for the whole of one `advance`
    pub(crate) fn lock_advance(&self) -> Result<MutexGuard<'_, ()>, CoreError> {
        self.advance_lock.lock().map_err(|_| {
            CoreError::StorageUnavailable(format!(
                "advance lock for chain {} poisoned",
                self.config.evm_chain_id
            ))
        })
    }
}

pub struct ChainCatalog {
    registry: Arc<dyn ChainRegistry>,
    handles: HashMap<u64, Arc<ChainHandle>>,
}

impl ChainCatalog {
    /// Open SQLite-backed storage under `data_dir` for every registered chain
    pub fn open(registry: Arc<dyn ChainRegistry>, data_dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let data_dir = data_dir.as_ref();
        let mut handles = Vec::new();

        for config in registry.all_chain_configs() {
            let chain_id = config.evm_chain_id;
            let events = SqliteEventLog::open(chain_id, events_db_path(data_dir, chain_id))?;
            let rollups = RollupStore::open(chain_id, rollups_db_path(data_dir, chain_id))?;
            handles.push(ChainHandle::new(config, Arc::new(events), rollups));
        }

        log::info!("🗂️  Catalog opened {} chains under {}", handles.len(), data_dir.display());
        Ok(Self::from_handles(registry, handles))
    }

    /// Build from prepared handles (custom event sources, tests)
    pub fn from_handles(registry: Arc<dyn ChainRegistry>, handles: Vec<ChainHandle>) -> Self {
        let handles = handles
            .into_iter()
            .map(|h| (h.chain_id(), Arc::new(h)))
            .collect();
        Self { registry, handles }
    }

    pub fn registry(&self) -> &Arc<dyn ChainRegistry> {
        &self.registry
    }

    pub fn handle(&self, chain_id: u64) -> Result<Arc<ChainHandle>, CoreError> {
        if !self.registry.contains(chain_id) {
            return Err(CoreError::ChainNotFound(chain_id));
        }
        self.handles
            .get(&chain_id)
            .cloned()
            .ok_or(CoreError::ChainNotFound(chain_id))
    }

    /// Chains with open storage, ascending
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .handles
            .keys()
            .copied()
            .filter(|id| self.registry.contains(*id))
            .collect();
        ids.sort_unstable();
        ids
    }
}
