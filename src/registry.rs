//! Chain registry: static per-chain metadata, read-only to the core

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::types::ChainConfig;

/// Source of chain metadata
pub trait ChainRegistry: Send + Sync {
    /// All configured chains, ordered by EVM chain ID
    fn all_chain_configs(&self) -> Vec<ChainConfig>;

    fn chain_config(&self, evm_chain_id: u64) -> Option<ChainConfig>;

    fn contains(&self, evm_chain_id: u64) -> bool {
        self.chain_config(evm_chain_id).is_some()
    }
}

/// Registry backed by a fixed list, typically loaded from `chains.json`
#[derive(Debug, Clone, Default)]
pub struct StaticChainRegistry {
    chains: BTreeMap<u64, ChainConfig>,
}

impl StaticChainRegistry {
    /// Build from a list; the first entry wins on duplicate chain IDs
    pub fn new(configs: Vec<ChainConfig>) -> Self {
        let mut chains = BTreeMap::new();
        for config in configs {
            if chains.contains_key(&config.evm_chain_id) {
                log::warn!(
                    "⚠️  Duplicate chain {} ({}) ignored",
                    config.evm_chain_id,
                    config.chain_name
                );
                continue;
            }
            chains.insert(config.evm_chain_id, config);
        }
        Self { chains }
    }

    /// Parse a JSON array of `{evmChainId, chainName, blockchainId}`
    pub fn from_json_str(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let configs: Vec<ChainConfig> = serde_json::from_str(json)?;
        Ok(Self::new(configs))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read chain registry {}: {}", path.display(), e))?;
        let registry = Self::from_json_str(&json)?;
        log::info!("📋 Loaded {} chains from {}", registry.chains.len(), path.display());
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl ChainRegistry for StaticChainRegistry {
    fn all_chain_configs(&self) -> Vec<ChainConfig> {
        self.chains.values().cloned().collect()
    }

    fn chain_config(&self, evm_chain_id: u64) -> Option<ChainConfig> {
        self.chains.get(&evm_chain_id).cloned()
    }
}
