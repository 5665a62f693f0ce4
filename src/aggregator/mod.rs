//! Aggregator - moves each chain's cursor through its event log
//!
//! One `advance` call:
//! 1. Take the chain's advance lock (no concurrent advancement per chain)
//! 2. Read the committed cursor from the rollup store
//! 3. Pull a bounded batch of events after it
//! 4. Validate ordering for the whole batch and group it by minute
//! 5. Commit deltas and the new cursor in one rollup transaction, provided
//!    the stored cursor still matches the one read in step 2
//!
//! Replaying from a committed cursor re-reads only unapplied events, so a
//! crash between steps 3 and 5 is recovered by the next call. The advance
//! lock only covers this process; another process sharing the data
//! directory is caught by the cursor check in step 5, and the batch is
//! re-planned from the newer cursor.

pub mod alerts;

pub use alerts::{LogAlert, OperatorAlert};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::catalog::ChainCatalog;
use crate::error::CoreError;
use crate::event_log::{EventCursor, LoggedEvent};
use crate::rollup::MinuteDelta;
use crate::types::{floor_minute, EventKind};

/// Outcome of one `advance` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceReport {
    pub chain_id: u64,
    pub events_applied: usize,
    pub cursor: EventCursor,
}

/// Rollup writes derived from one validated batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub deltas: Vec<MinuteDelta>,
    pub cursor: EventCursor,
}

/// Validate delivery order and group a batch into minute deltas
///
/// Every event key must be strictly greater than the one before it, starting
/// from the cursor key. No state is touched; the caller commits the plan.
pub fn plan_batch(
    chain_id: u64,
    cursor: &EventCursor,
    batch: &[LoggedEvent],
) -> Result<BatchPlan, CoreError> {
    let mut deltas: Vec<MinuteDelta> = Vec::new();
    let mut next_cursor = *cursor;

    for logged in batch {
        let key = logged.event.key();

        if let Some(prev) = next_cursor.last_key {
            if key <= prev {
                return Err(CoreError::OutOfOrderEvent {
                    chain_id,
                    event_id: logged.id,
                    event_key: key,
                    cursor_key: prev,
                });
            }
        }

        let minute_ts = floor_minute(key.block_timestamp);
        if deltas.last().map(|d| d.minute_ts) != Some(minute_ts) {
            deltas.push(MinuteDelta::new(minute_ts));
        }
        // Just pushed if it was missing
        if let Some(delta) = deltas.last_mut() {
            if logged.event.kind == EventKind::Tx {
                let gas = logged.event.gas_used.unwrap_or(0);
                delta.gas_used = delta.gas_used.checked_add(gas).ok_or_else(|| {
                    CoreError::InvalidEvent(format!(
                        "chain {}: gas for minute {} overflows at event #{}",
                        chain_id, minute_ts, logged.id
                    ))
                })?;
                delta.tx_count += 1;
                for address in logged.event.active_addresses() {
                    delta.addresses.insert(address.to_string());
                }
            }
        }

        next_cursor = EventCursor {
            last_event_id: logged.id,
            last_key: Some(key),
        };
    }

    Ok(BatchPlan {
        deltas,
        cursor: next_cursor,
    })
}

/// Incremental rollup driver for every chain in the catalog
pub struct Aggregator {
    catalog: Arc<ChainCatalog>,
    batch_size: usize,
    halted: Mutex<HashMap<u64, CoreError>>,
}

impl Aggregator {
    pub fn new(catalog: Arc<ChainCatalog>, batch_size: usize) -> Self {
        Self {
            catalog,
            batch_size: batch_size.max(1),
            halted: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<ChainCatalog> {
        &self.catalog
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Apply one bounded batch of new events for `chain_id`
    pub fn advance(&self, chain_id: u64) -> Result<AdvanceReport, CoreError> {
        let handle = self.catalog.handle(chain_id)?;
        let _guard = handle.lock_advance()?;

        // Each lost race means another writer committed, so this ends once
        // the log is drained
        loop {
            if let Some(err) = self.halt_reason(chain_id)? {
                return Err(err);
            }

            let cursor = handle.rollups().cursor()?;
            let batch = handle.events().stream_since(&cursor, self.batch_size)?;

            if batch.is_empty() {
                return Ok(AdvanceReport {
                    chain_id,
                    events_applied: 0,
                    cursor,
                });
            }

            let plan = match plan_batch(chain_id, &cursor, &batch) {
                Ok(plan) => plan,
                Err(err) => {
                    log::error!("❌ Chain {}: {}", chain_id, err);
                    self.halt(chain_id, err.clone())?;
                    return Err(err);
                }
            };

            if !handle.rollups().upsert_batch(&cursor, &plan.deltas, &plan.cursor)? {
                log::warn!(
                    "⚠️  Chain {}: cursor moved past #{} under another writer, re-planning",
                    chain_id,
                    cursor.last_event_id
                );
                continue;
            }

            log::debug!(
                "📈 Chain {}: applied {} events over {} minutes (cursor → #{})",
                chain_id,
                batch.len(),
                plan.deltas.len(),
                plan.cursor.last_event_id
            );

            return Ok(AdvanceReport {
                chain_id,
                events_applied: batch.len(),
                cursor: plan.cursor,
            });
        }
    }

    /// Advance repeatedly until a call applies nothing
    pub fn advance_until_caught_up(&self, chain_id: u64) -> Result<AdvanceReport, CoreError> {
        let mut total = 0;
        loop {
            let report = self.advance(chain_id)?;
            total += report.events_applied;
            if report.events_applied == 0 {
                return Ok(AdvanceReport {
                    events_applied: total,
                    ..report
                });
            }
        }
    }

    pub fn is_halted(&self, chain_id: u64) -> Result<bool, CoreError> {
        Ok(self.halt_reason(chain_id)?.is_some())
    }

    /// Clear a halt after the event log was corrected upstream
    ///
    /// Returns whether the chain was halted.
    pub fn resume(&self, chain_id: u64) -> Result<bool, CoreError> {
        let was_halted = self.lock_halted()?.remove(&chain_id).is_some();
        if was_halted {
            log::info!("▶️  Chain {} resumed by operator", chain_id);
        }
        Ok(was_halted)
    }

    fn halt(&self, chain_id: u64, reason: CoreError) -> Result<(), CoreError> {
        self.lock_halted()?.insert(chain_id, reason);
        Ok(())
    }

    fn halt_reason(&self, chain_id: u64) -> Result<Option<CoreError>, CoreError> {
        Ok(self.lock_halted()?.get(&chain_id).cloned())
    }

    fn lock_halted(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u64, CoreError>>, CoreError> {
        self.halted
            .lock()
            .map_err(|_| CoreError::StorageUnavailable("halt table lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, EventKey, Protocol};

    const CHAIN: u64 = 43114;

    fn logged(id: i64, event: Event) -> LoggedEvent {
        LoggedEvent { id, event }
    }

    #[test]
    fn test_plan_groups_by_minute() {
        let batch = vec![
            logged(1, Event::tx(CHAIN, 1700000100, 0, 21_000).with_addresses(Some("0xa"), Some("0xb"))),
            logged(2, Event::tx(CHAIN, 1700000100, 1, 30_000).with_addresses(Some("0xa"), None)),
            logged(3, Event::tx(CHAIN, 1700000165, 0, 50_000)),
        ];

        let plan = plan_batch(CHAIN, &EventCursor::genesis(), &batch).unwrap();
        assert_eq!(plan.deltas.len(), 2);
        assert_eq!(plan.deltas[0].minute_ts, 1700000100);
        assert_eq!(plan.deltas[0].tx_count, 2);
        assert_eq!(plan.deltas[0].gas_used, 51_000);
        assert_eq!(plan.deltas[0].addresses.len(), 2);
        assert_eq!(plan.deltas[1].minute_ts, 1700000160);
        assert_eq!(plan.cursor.last_event_id, 3);
        assert_eq!(
            plan.cursor.last_key,
            Some(EventKey { block_timestamp: 1700000165, sequence_in_block: 0 })
        );
    }

    #[test]
    fn test_messages_only_touch_slots() {
        let batch = vec![logged(
            1,
            Event::message(CHAIN, 1700000100, 0, Protocol::Icm, "chainA", true),
        )];

        let plan = plan_batch(CHAIN, &EventCursor::genesis(), &batch).unwrap();
        assert_eq!(plan.deltas.len(), 1);
        assert_eq!(plan.deltas[0].tx_count, 0);
        assert!(plan.deltas[0].addresses.is_empty());
    }

    #[test]
    fn test_out_of_order_against_cursor() {
        let cursor = EventCursor {
            last_event_id: 10,
            last_key: Some(EventKey { block_timestamp: 1700000100, sequence_in_block: 0 }),
        };
        let batch = vec![logged(11, Event::tx(CHAIN, 1700000000, 0, 1))];

        match plan_batch(CHAIN, &cursor, &batch) {
            Err(CoreError::OutOfOrderEvent { event_id, cursor_key, .. }) => {
                assert_eq!(event_id, 11);
                assert_eq!(cursor_key.block_timestamp, 1700000100);
            }
            other => panic!("expected OutOfOrderEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_key_inside_batch_rejected() {
        let batch = vec![
            logged(1, Event::tx(CHAIN, 1700000100, 4, 1)),
            logged(2, Event::tx(CHAIN, 1700000100, 4, 1)),
        ];
        assert!(matches!(
            plan_batch(CHAIN, &EventCursor::genesis(), &batch),
            Err(CoreError::OutOfOrderEvent { event_id: 2, .. })
        ));
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let batch = vec![
            logged(1, Event::tx(CHAIN, 1700000100, 0, 1)),
            logged(2, Event::tx(CHAIN, 1700000100, 1, 1)),
        ];
        let plan = plan_batch(CHAIN, &EventCursor::genesis(), &batch).unwrap();
        assert_eq!(plan.deltas[0].tx_count, 2);
    }

    #[test]
    fn test_gas_overflow_in_minute_rejected() {
        // Straight from an event source, so validation never saw these
        let batch = vec![
            logged(1, Event::tx(CHAIN, 1700000100, 0, u64::MAX)),
            logged(2, Event::tx(CHAIN, 1700000100, 1, 1)),
        ];
        match plan_batch(CHAIN, &EventCursor::genesis(), &batch) {
            Err(CoreError::InvalidEvent(msg)) => assert!(msg.contains("#2")),
            other => panic!("expected InvalidEvent, got {:?}", other),
        }
    }
}
