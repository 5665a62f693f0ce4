//! Read side: window queries over rollups and chain-pair scans over events
//!
//! Both engines borrow a chain's storage handle and never write. They may
//! run while the aggregator is advancing the same chain.

pub mod chain_pair;
pub mod window;

pub use chain_pair::{ChainPairAggregator, ChainPairRow};
pub use window::{avg_daily, DailyPoint, RangeTotal, WindowQueryEngine};

use serde::Serialize;

/// Point-in-time cumulative value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeValue {
    pub timestamp: i64,
    pub value: u64,
}
