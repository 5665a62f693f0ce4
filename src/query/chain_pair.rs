//! Chain Pair Aggregator
//!
//! Groups message events by counterparty and protocol straight from the
//! event log. Each protocol gets an existence check first, so chains that
//! never used it skip the scan.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::event_log::EventSource;
use crate::types::{Event, Protocol, TimeRange, DAY_SECS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPairRow {
    pub counterparty_chain_id: String,
    pub protocol: Protocol,
    pub inbound: u64,
    pub outbound: u64,
    pub total: u64,
}

pub struct ChainPairAggregator<'a> {
    events: &'a dyn EventSource,
    max_range_days: i64,
}

impl<'a> ChainPairAggregator<'a> {
    pub fn new(events: &'a dyn EventSource, max_range_days: i64) -> Self {
        Self {
            events,
            max_range_days,
        }
    }

    /// Message counts per `(counterparty, protocol)` for `start <= ts <= end`
    ///
    /// Sorted by total descending, then counterparty and protocol ascending.
    pub fn breakdown(&self, range: &TimeRange) -> Result<Vec<ChainPairRow>, CoreError> {
        if range.end() < range.start() {
            return Ok(Vec::new());
        }
        if range.span_secs() > self.max_range_days.saturating_mul(DAY_SECS) {
            return Err(CoreError::InvalidRange(format!(
                "chain pair range spans more than {} days",
                self.max_range_days
            )));
        }

        // (inbound, outbound)
        let mut groups: BTreeMap<(String, Protocol), (u64, u64)> = BTreeMap::new();

        for protocol in Protocol::all() {
            if !self.events.has_protocol_messages(protocol)? {
                log::debug!(
                    "⏭️  Chain {} has no {} messages, skipping scan",
                    self.events.chain_id(),
                    protocol
                );
                continue;
            }

            self.events
                .for_each_message(protocol, range.start(), range.end(), &mut |event: &Event| {
                    let (Some(counterparty), Some(is_outgoing)) =
                        (event.counterparty_chain_id.as_ref(), event.is_outgoing)
                    else {
                        return;
                    };
                    let entry = groups.entry((counterparty.clone(), protocol)).or_default();
                    if is_outgoing {
                        entry.1 += 1;
                    } else {
                        entry.0 += 1;
                    }
                })?;
        }

        let mut rows: Vec<ChainPairRow> = groups
            .into_iter()
            .map(|((counterparty_chain_id, protocol), (inbound, outbound))| ChainPairRow {
                counterparty_chain_id,
                protocol,
                inbound,
                outbound,
                total: inbound + outbound,
            })
            .collect();

        rows.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.counterparty_chain_id.cmp(&b.counterparty_chain_id))
                .then_with(|| a.protocol.cmp(&b.protocol))
        });

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventCursor, LoggedEvent};

    /// In-memory source that counts scans
    struct VecSource {
        events: Vec<Event>,
        scans: std::sync::Mutex<u32>,
    }

    impl VecSource {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events,
                scans: std::sync::Mutex::new(0),
            }
        }
    }

    impl EventSource for VecSource {
        fn chain_id(&self) -> u64 {
            43114
        }

        fn stream_since(&self, _cursor: &EventCursor, _limit: usize) -> Result<Vec<LoggedEvent>, CoreError> {
            Ok(Vec::new())
        }

        fn has_protocol_messages(&self, protocol: Protocol) -> Result<bool, CoreError> {
            Ok(self.events.iter().any(|e| e.protocol == Some(protocol)))
        }

        fn for_each_message(
            &self,
            protocol: Protocol,
            from_ts: i64,
            to_ts: i64,
            visit: &mut dyn FnMut(&Event),
        ) -> Result<(), CoreError> {
            *self.scans.lock().unwrap() += 1;
            self.events
                .iter()
                .filter(|e| e.protocol == Some(protocol))
                .filter(|e| e.block_timestamp >= from_ts && e.block_timestamp <= to_ts)
                .for_each(|e| visit(e));
            Ok(())
        }
    }

    fn msg(ts: i64, seq: u32, protocol: Protocol, counterparty: &str, outgoing: bool) -> Event {
        Event::message(43114, ts, seq, protocol, counterparty, outgoing)
    }

    #[test]
    fn test_breakdown_sorted_with_ties() {
        let source = VecSource::new(vec![
            msg(100, 0, Protocol::Icm, "chainB", true),
            msg(100, 1, Protocol::Icm, "chainB", false),
            msg(101, 0, Protocol::Icm, "chainA", true),
            msg(101, 1, Protocol::Icm, "chainA", true),
            msg(102, 0, Protocol::Layerzero, "30101", false),
            msg(103, 0, Protocol::Layerzero, "30101", false),
            msg(104, 0, Protocol::Layerzero, "30184", true),
        ]);
        let aggregator = ChainPairAggregator::new(&source, 366);

        let rows = aggregator.breakdown(&TimeRange::new(100, 104).unwrap()).unwrap();
        let keys: Vec<(&str, u64)> = rows
            .iter()
            .map(|r| (r.counterparty_chain_id.as_str(), r.total))
            .collect();
        assert_eq!(
            keys,
            vec![("30101", 2), ("chainA", 2), ("chainB", 2), ("30184", 1)]
        );
        assert_eq!(rows[0].inbound, 2);
        assert_eq!(rows[1].outbound, 2);
        assert_eq!(rows[2].inbound, 1);
        assert_eq!(rows[2].outbound, 1);
    }

    #[test]
    fn test_same_counterparty_split_by_protocol() {
        let source = VecSource::new(vec![
            msg(100, 0, Protocol::Layerzero, "x", true),
            msg(101, 0, Protocol::Icm, "x", true),
        ]);
        let rows = ChainPairAggregator::new(&source, 366)
            .breakdown(&TimeRange::new(0, 200).unwrap())
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].protocol, Protocol::Icm);
        assert_eq!(rows[1].protocol, Protocol::Layerzero);
    }

    #[test]
    fn test_existence_check_skips_unused_protocol() {
        let source = VecSource::new(vec![msg(100, 0, Protocol::Icm, "chainA", true)]);
        ChainPairAggregator::new(&source, 366)
            .breakdown(&TimeRange::new(0, 200).unwrap())
            .unwrap();
        assert_eq!(*source.scans.lock().unwrap(), 1);

        let empty = VecSource::new(Vec::new());
        let rows = ChainPairAggregator::new(&empty, 366)
            .breakdown(&TimeRange::new(0, 200).unwrap())
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(*empty.scans.lock().unwrap(), 0);
    }

    #[test]
    fn test_range_bounds() {
        let source = VecSource::new(vec![msg(100, 0, Protocol::Icm, "chainA", true)]);
        let aggregator = ChainPairAggregator::new(&source, 1);

        assert!(aggregator.breakdown(&TimeRange::new(200, 100).unwrap()).unwrap().is_empty());
        assert!(matches!(
            aggregator.breakdown(&TimeRange::new(0, DAY_SECS + 1).unwrap()),
            Err(CoreError::InvalidRange(_))
        ));
        // Inclusive end
        let rows = aggregator.breakdown(&TimeRange::new(50, 100).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
