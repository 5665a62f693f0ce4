//! Operator alert channel
//!
//! The scheduler reports conditions that need a human here. `LogAlert` is
//! the default sink; deployments can plug in paging or chat integrations.

use async_trait::async_trait;

use crate::error::CoreError;

#[async_trait]
pub trait OperatorAlert: Send + Sync {
    /// Chain advancement stopped; needs upstream correction and `resume`
    async fn chain_halted(&self, chain_id: u64, error: &CoreError);

    /// Transient storage failure; advancement retries next tick
    async fn storage_degraded(&self, chain_id: u64, error: &CoreError);
}

/// Alerts written to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

#[async_trait]
impl OperatorAlert for LogAlert {
    async fn chain_halted(&self, chain_id: u64, error: &CoreError) {
        log::error!("🛑 Chain {} HALTED: {}", chain_id, error);
        log::error!("   └─ Fix the event log upstream, then resume the chain");
    }

    async fn storage_degraded(&self, chain_id: u64, error: &CoreError) {
        log::warn!("⚠️  Chain {} storage degraded, retrying next tick: {}", chain_id, error);
    }
}
