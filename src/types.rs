//! Core data model: raw events, rollup rows, chain metadata and metric kinds
//!
//! All timestamps are unix seconds. Bucket keys are floored with
//! `floor_minute` / `floor_day` so that every component agrees on the
//! half-open slot `[slot_ts, slot_ts + width)` an event belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

pub const MINUTE_SECS: i64 = 60;
pub const DAY_SECS: i64 = 86_400;

/// Floor a timestamp to the start of its minute
pub fn floor_minute(ts: i64) -> i64 {
    ts.div_euclid(MINUTE_SECS) * MINUTE_SECS
}

/// Floor a timestamp to the start of its UTC day
pub fn floor_day(ts: i64) -> i64 {
    ts.div_euclid(DAY_SECS) * DAY_SECS
}

/// A string that names no known event kind, protocol or metric
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} '{value}'")]
pub struct UnknownTag {
    what: &'static str,
    value: String,
}

impl UnknownTag {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Tx,
    Message,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Tx => "tx",
            EventKind::Message => "message",
        }
    }
}

impl FromStr for EventKind {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tx" => Ok(EventKind::Tx),
            "message" => Ok(EventKind::Message),
            _ => Err(UnknownTag::new("event kind", s)),
        }
    }
}

/// Cross-chain messaging protocol family
///
/// ICM counterparties are identified by blockchain ID, LayerZero
/// counterparties by endpoint ID. Both are carried as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Icm,
    Layerzero,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Icm => "icm",
            Protocol::Layerzero => "layerzero",
        }
    }

    pub fn all() -> [Protocol; 2] {
        [Protocol::Icm, Protocol::Layerzero]
    }
}

impl FromStr for Protocol {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icm" => Ok(Protocol::Icm),
            "layerzero" => Ok(Protocol::Layerzero),
            _ => Err(UnknownTag::new("protocol", s)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering key of an event within its chain
///
/// Field order matters: the derived `Ord` compares `block_timestamp` first,
/// then `sequence_in_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub block_timestamp: i64,
    pub sequence_in_block: u32,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block_timestamp, self.sequence_in_block)
    }
}

/// A raw indexed event, immutable once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub chain_id: u64,
    pub block_timestamp: i64,
    pub sequence_in_block: u32,
    pub kind: EventKind,
    #[serde(default)]
    pub gas_used: Option<u64>,
    /// Native value transferred, as a decimal string (may exceed 64 bits)
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub counterparty_chain_id: Option<String>,
    #[serde(default)]
    pub is_outgoing: Option<bool>,
}

impl Event {
    /// Build a transaction event
    pub fn tx(chain_id: u64, block_timestamp: i64, sequence_in_block: u32, gas_used: u64) -> Self {
        Self {
            chain_id,
            block_timestamp,
            sequence_in_block,
            kind: EventKind::Tx,
            gas_used: Some(gas_used),
            value: None,
            from_address: None,
            to_address: None,
            protocol: None,
            counterparty_chain_id: None,
            is_outgoing: None,
        }
    }

    /// Build a cross-chain message event
    pub fn message(
        chain_id: u64,
        block_timestamp: i64,
        sequence_in_block: u32,
        protocol: Protocol,
        counterparty_chain_id: impl Into<String>,
        is_outgoing: bool,
    ) -> Self {
        Self {
            chain_id,
            block_timestamp,
            sequence_in_block,
            kind: EventKind::Message,
            gas_used: None,
            value: None,
            from_address: None,
            to_address: None,
            protocol: Some(protocol),
            counterparty_chain_id: Some(counterparty_chain_id.into()),
            is_outgoing: Some(is_outgoing),
        }
    }

    pub fn with_addresses(mut self, from: Option<&str>, to: Option<&str>) -> Self {
        self.from_address = from.map(str::to_string);
        self.to_address = to.map(str::to_string);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            block_timestamp: self.block_timestamp,
            sequence_in_block: self.sequence_in_block,
        }
    }

    /// Addresses that make this event count towards active-address metrics
    pub fn active_addresses(&self) -> impl Iterator<Item = &str> {
        self.from_address
            .as_deref()
            .into_iter()
            .chain(self.to_address.as_deref())
            .filter(|a| !a.is_empty())
    }

    /// Structural validation applied before an event enters the log
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.block_timestamp < 0 {
            return Err(CoreError::InvalidEvent(format!(
                "negative block timestamp {}",
                self.block_timestamp
            )));
        }

        if self.kind == EventKind::Message {
            if self.protocol.is_none() {
                return Err(CoreError::InvalidEvent(format!(
                    "message at {} has no protocol",
                    self.key()
                )));
            }
            if self.counterparty_chain_id.as_deref().map_or(true, str::is_empty) {
                return Err(CoreError::InvalidEvent(format!(
                    "message at {} has no counterparty chain",
                    self.key()
                )));
            }
            if self.is_outgoing.is_none() {
                return Err(CoreError::InvalidEvent(format!(
                    "message at {} has no direction",
                    self.key()
                )));
            }
        }

        // Rollup totals are stored as signed 64-bit integers
        if let Some(gas) = self.gas_used {
            if gas > i64::MAX as u64 {
                return Err(CoreError::InvalidEvent(format!(
                    "gas used {} at {} exceeds {}",
                    gas,
                    self.key(),
                    i64::MAX
                )));
            }
        }

        if let Some(ref value) = self.value {
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CoreError::InvalidEvent(format!(
                    "value '{}' is not a decimal integer",
                    value
                )));
            }
        }

        Ok(())
    }
}

/// Per-minute rollup row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteBucket {
    pub chain_id: u64,
    pub minute_ts: i64,
    pub tx_count: u64,
    pub gas_used: u64,
    pub active_address_count: u64,
}

/// Per-day rollup row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub chain_id: u64,
    pub day_ts: i64,
    pub active_address_count: u64,
    pub total_tx_count: u64,
    pub total_gas_used: u64,
}

/// Running totals through `minute_ts` inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeCounter {
    pub chain_id: u64,
    pub minute_ts: i64,
    pub cumulative_tx_count: u64,
    pub cumulative_gas_used: u64,
}

impl CumulativeCounter {
    /// "No data yet" sentinel
    pub fn zero(chain_id: u64) -> Self {
        Self {
            chain_id,
            minute_ts: 0,
            cumulative_tx_count: 0,
            cumulative_gas_used: 0,
        }
    }

    /// Value of a monotonic metric; `None` for metrics with no running total
    pub fn value(&self, metric: Metric) -> Option<u64> {
        match metric {
            Metric::TxCount => Some(self.cumulative_tx_count),
            Metric::GasUsed => Some(self.cumulative_gas_used),
            Metric::ActiveAddresses => None,
        }
    }
}

/// Static chain metadata supplied by the chain registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub evm_chain_id: u64,
    pub chain_name: String,
    pub blockchain_id: String,
}

/// Metric kinds served by the window query engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    TxCount,
    GasUsed,
    ActiveAddresses,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TxCount => "tx",
            Metric::GasUsed => "gas",
            Metric::ActiveAddresses => "addresses",
        }
    }

    /// Metrics backed by a cumulative counter
    pub fn is_monotonic(&self) -> bool {
        !matches!(self, Metric::ActiveAddresses)
    }
}

impl FromStr for Metric {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tx" | "txCount" => Ok(Metric::TxCount),
            "gas" | "gasUsed" => Ok(Metric::GasUsed),
            "addresses" | "activeAddresses" => Ok(Metric::ActiveAddresses),
            _ => Err(UnknownTag::new("metric", s)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated query window `[start, end)`
///
/// Only constructible through `new` / `parse`, so both bounds are always
/// non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: i64,
    end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Result<Self, CoreError> {
        if start < 0 || end < 0 {
            return Err(CoreError::InvalidRange(format!(
                "timestamps must be non-negative (start={}, end={})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse raw request parameters
    pub fn parse(start: &str, end: &str) -> Result<Self, CoreError> {
        let parse_one = |name: &str, raw: &str| -> Result<i64, CoreError> {
            raw.trim().parse::<i64>().map_err(|_| {
                CoreError::InvalidRange(format!("{} '{}' is not a unix timestamp", name, raw))
            })
        };
        Self::new(parse_one("startTimestamp", start)?, parse_one("endTimestamp", end)?)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    pub fn span_secs(&self) -> i64 {
        (self.end - self.start).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_helpers() {
        assert_eq!(floor_minute(1700000100), 1700000100);
        assert_eq!(floor_minute(1700000159), 1700000100);
        assert_eq!(floor_minute(1700000000), 1699999980);
        assert_eq!(floor_day(1700000000), 1699920000);
        assert_eq!(floor_day(1699920000), 1699920000);
    }

    #[test]
    fn test_event_key_ordering() {
        let a = EventKey { block_timestamp: 100, sequence_in_block: 5 };
        let b = EventKey { block_timestamp: 100, sequence_in_block: 6 };
        let c = EventKey { block_timestamp: 101, sequence_in_block: 0 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_active_addresses_skip_missing() {
        let event = Event::tx(1, 100, 0, 21_000).with_addresses(Some("0xaa"), None);
        let addrs: Vec<&str> = event.active_addresses().collect();
        assert_eq!(addrs, vec!["0xaa"]);
    }

    #[test]
    fn test_message_validation() {
        let ok = Event::message(1, 100, 0, Protocol::Icm, "2q9e4r6Mu3U68nU1fYjgbR6JvwrRx36CohpAX5UQxse55x1Q5", true);
        assert!(ok.validate().is_ok());

        let mut missing = ok.clone();
        missing.protocol = None;
        assert!(matches!(missing.validate(), Err(CoreError::InvalidEvent(_))));

        let bad_value = Event::tx(1, 100, 1, 21_000).with_value("12ab");
        assert!(bad_value.validate().is_err());
    }

    #[test]
    fn test_time_range_parse() {
        let range = TimeRange::parse("1700000000", "1700086400").unwrap();
        assert_eq!(range.span_secs(), 86_400);

        assert!(matches!(TimeRange::parse("abc", "1"), Err(CoreError::InvalidRange(_))));
        assert!(matches!(TimeRange::parse("-5", "1"), Err(CoreError::InvalidRange(_))));
        assert!(TimeRange::new(10, 5).unwrap().is_degenerate());
    }

    #[test]
    fn test_time_range_bounds_checked_on_construction() {
        assert!(matches!(TimeRange::new(-500, 100), Err(CoreError::InvalidRange(_))));
        assert!(matches!(TimeRange::new(100, -1), Err(CoreError::InvalidRange(_))));

        let range = TimeRange::new(100, 700).unwrap();
        assert_eq!((range.start(), range.end()), (100, 700));
    }

    #[test]
    fn test_gas_beyond_signed_range_rejected() {
        let at_limit = Event::tx(1, 100, 0, i64::MAX as u64);
        assert!(at_limit.validate().is_ok());

        let over = Event::tx(1, 100, 1, i64::MAX as u64 + 1);
        assert!(matches!(over.validate(), Err(CoreError::InvalidEvent(_))));
    }

    #[test]
    fn test_tags_parse_with_from_str() {
        assert_eq!("message".parse::<EventKind>(), Ok(EventKind::Message));
        assert_eq!("layerzero".parse::<Protocol>(), Ok(Protocol::Layerzero));
        assert_eq!("gasUsed".parse::<Metric>(), Ok(Metric::GasUsed));
        assert_eq!("addresses".parse::<Metric>(), Ok(Metric::ActiveAddresses));

        let err = "volume".parse::<Metric>().unwrap_err();
        assert_eq!(err.to_string(), "unknown metric 'volume'");
        assert!("ICM".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_parse_event_json() {
        let line = r#"{"chainId":43114,"blockTimestamp":1700000100,"sequenceInBlock":3,"kind":"message","protocol":"layerzero","counterpartyChainId":"30101","isOutgoing":false}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(event.kind, EventKind::Message);
        assert_eq!(event.protocol, Some(Protocol::Layerzero));
        assert_eq!(event.is_outgoing, Some(false));
        assert!(event.gas_used.is_none());
    }
}
