//! Error taxonomy shared by every component

use crate::types::{EventKey, Metric};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// Requested chain is absent from the chain registry
    #[error("chain {0} not found")]
    ChainNotFound(u64),

    /// Malformed query window
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Event delivered out of key order; halts the chain until resolved
    #[error(
        "out-of-order event on chain {chain_id}: event #{event_id} at {event_key} does not follow {cursor_key}"
    )]
    OutOfOrderEvent {
        chain_id: u64,
        event_id: i64,
        event_key: EventKey,
        cursor_key: EventKey,
    },

    /// Event log or rollup store failed a read or write
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Event rejected at append time
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("metric '{0}' has no point-in-time value")]
    UnsupportedMetric(Metric),
}

impl CoreError {
    /// Only storage failures are transient
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable(_))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::StorageUnavailable(err.to_string())
    }
}
