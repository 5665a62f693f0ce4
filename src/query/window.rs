//! Window Query Engine
//!
//! Point-in-time values come from cumulative counters. Range totals of
//! monotonic metrics are differences of two point-in-time values; distinct
//! addresses are an exact union over the day sets touching the range.

use serde::Serialize;

use crate::error::CoreError;
use crate::rollup::RollupStore;
use crate::types::{floor_day, floor_minute, Metric, TimeRange, DAY_SECS};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeTotal {
    pub total: u64,
    pub avg_daily: f64,
}

impl RangeTotal {
    pub fn zero() -> Self {
        Self {
            total: 0,
            avg_daily: 0.0,
        }
    }
}

/// One complete UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub timestamp: i64,
    pub tx_count: u64,
    pub gas_used: u64,
    pub active_addresses: u64,
}

/// `total / max(1, ceil(span_days))`, 0 for degenerate ranges
pub fn avg_daily(total: u64, range: &TimeRange) -> f64 {
    if range.is_degenerate() {
        return 0.0;
    }
    let days = (range.span_secs() + DAY_SECS - 1) / DAY_SECS;
    total as f64 / days.max(1) as f64
}

pub struct WindowQueryEngine<'a> {
    store: &'a RollupStore,
}

impl<'a> WindowQueryEngine<'a> {
    pub fn new(store: &'a RollupStore) -> Self {
        Self { store }
    }

    /// Cumulative value of a monotonic metric at `ts` (floored to the minute)
    pub fn value_as_of(&self, metric: Metric, ts: i64) -> Result<u64, CoreError> {
        if !metric.is_monotonic() {
            return Err(CoreError::UnsupportedMetric(metric));
        }
        let counter = self.store.as_of(floor_minute(ts))?;
        counter.value(metric).ok_or(CoreError::UnsupportedMetric(metric))
    }

    pub fn total_in_range(&self, metric: Metric, from_ts: i64, to_ts: i64) -> Result<u64, CoreError> {
        if to_ts <= from_ts {
            return Ok(0);
        }

        match metric {
            Metric::TxCount | Metric::GasUsed => {
                let end = self.value_as_of(metric, to_ts)?;
                let start = self.value_as_of(metric, from_ts)?;
                Ok(end.saturating_sub(start))
            }
            Metric::ActiveAddresses => self
                .store
                .distinct_addresses_between(floor_day(from_ts), floor_day(to_ts)),
        }
    }

    pub fn range_total(&self, metric: Metric, range: &TimeRange) -> Result<RangeTotal, CoreError> {
        if range.is_degenerate() {
            return Ok(RangeTotal::zero());
        }
        let total = self.total_in_range(metric, range.start(), range.end())?;
        Ok(RangeTotal {
            total,
            avg_daily: avg_daily(total, range),
        })
    }

    /// The `days` complete UTC days before `now`, oldest first
    ///
    /// Days without a bucket are filled with zeros.
    pub fn daily_series(&self, days: u32, now: i64) -> Result<Vec<DailyPoint>, CoreError> {
        if days == 0 {
            return Ok(Vec::new());
        }

        let today = floor_day(now);
        let first_day = today - i64::from(days) * DAY_SECS;
        let last_day = today - DAY_SECS;

        let mut buckets = self.store.day_range(first_day, last_day)?.into_iter().peekable();
        let mut series = Vec::with_capacity(days as usize);

        let mut day = first_day;
        while day <= last_day {
            let point = if buckets.peek().map(|b| b.day_ts) == Some(day) {
                buckets.next().map(|b| DailyPoint {
                    timestamp: day,
                    tx_count: b.total_tx_count,
                    gas_used: b.total_gas_used,
                    active_addresses: b.active_address_count,
                })
            } else {
                None
            };
            series.push(point.unwrap_or(DailyPoint {
                timestamp: day,
                tx_count: 0,
                gas_used: 0,
                active_addresses: 0,
            }));
            day += DAY_SECS;
        }

        Ok(series)
    }
}
