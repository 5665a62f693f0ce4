//! Event Log - ordered, append-only per-chain store of raw indexed events
//!
//! The core only reads the log through [`EventSource`]. Delivery order is the
//! append order (`id`); the aggregator checks that delivery order agrees with
//! the `(block_timestamp, sequence_in_block)` key order.
//!
//! ```text
//! ingestion collaborator → SqliteEventLog::append
//!     ↓
//! EventSource::stream_since(cursor, limit) → Aggregator
//! EventSource::for_each_message(...)       → ChainPairAggregator
//! ```

pub mod jsonl;
pub mod sqlite_log;

pub use jsonl::parse_jsonl_event;
pub use sqlite_log::SqliteEventLog;

use crate::error::CoreError;
use crate::types::{Event, EventKey, Protocol};
use serde::Serialize;

/// Ingestion position: the last event a consumer has durably applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCursor {
    /// Delivery position in the log (0 = nothing applied yet)
    pub last_event_id: i64,
    /// Key of the last applied event
    pub last_key: Option<EventKey>,
}

impl EventCursor {
    pub fn genesis() -> Self {
        Self::default()
    }

    pub fn is_genesis(&self) -> bool {
        self.last_event_id == 0
    }
}

/// An event together with its delivery position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub id: i64,
    pub event: Event,
}

/// Read contract the core consumes from the event log collaborator
pub trait EventSource: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Up to `limit` events delivered after `cursor`, in delivery order
    ///
    /// Restartable: calling again with any previously returned cursor yields
    /// the same sequence.
    fn stream_since(&self, cursor: &EventCursor, limit: usize) -> Result<Vec<LoggedEvent>, CoreError>;

    /// O(1) check: has this chain ever logged a message for `protocol`?
    fn has_protocol_messages(&self, protocol: Protocol) -> Result<bool, CoreError>;

    /// Visit message events of `protocol` with `from_ts <= block_timestamp <= to_ts`
    fn for_each_message(
        &self,
        protocol: Protocol,
        from_ts: i64,
        to_ts: i64,
        visit: &mut dyn FnMut(&Event),
    ) -> Result<(), CoreError>;
}
