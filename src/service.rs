//! Caller-facing analytics operations
//!
//! Every operation resolves the chain through the catalog first, so unknown
//! chains fail before storage is read. Transient storage failures are retried
//! with exponential backoff; everything else returns immediately.

use std::sync::Arc;

use crate::catalog::ChainCatalog;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::query::{
    ChainPairAggregator, ChainPairRow, CumulativeValue, DailyPoint, RangeTotal, WindowQueryEngine,
};
use crate::types::{floor_minute, Metric, TimeRange};

pub const MAX_SERIES_DAYS: u32 = 366;

pub struct AnalyticsService {
    catalog: Arc<ChainCatalog>,
    config: EngineConfig,
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl AnalyticsService {
    pub fn new(catalog: Arc<ChainCatalog>, config: EngineConfig) -> Self {
        Self {
            catalog,
            config,
            now_fn: Box::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Replace the wall clock (tests, backfills)
    pub fn with_clock<F>(mut self, now_fn: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.now_fn = Box::new(now_fn);
        self
    }

    pub fn catalog(&self) -> &Arc<ChainCatalog> {
        &self.catalog
    }

    /// Cumulative value at `timestamp`, or the latest known value
    pub async fn cumulative_as_of(
        &self,
        chain_id: u64,
        metric: Metric,
        timestamp: Option<i64>,
    ) -> Result<CumulativeValue, CoreError> {
        let handle = self.catalog.handle(chain_id)?;
        if !metric.is_monotonic() {
            return Err(CoreError::UnsupportedMetric(metric));
        }

        match timestamp {
            Some(ts) if ts < 0 => Err(CoreError::InvalidRange(format!(
                "timestamp {} is negative",
                ts
            ))),
            Some(ts) => {
                let value = self
                    .with_retry("cumulative_as_of", || {
                        WindowQueryEngine::new(handle.rollups()).value_as_of(metric, ts)
                    })
                    .await?;
                Ok(CumulativeValue {
                    timestamp: floor_minute(ts),
                    value,
                })
            }
            None => {
                let latest = self
                    .with_retry("cumulative_as_of", || handle.rollups().latest_cumulative())
                    .await?;
                Ok(CumulativeValue {
                    timestamp: latest.minute_ts,
                    value: latest.value(metric).unwrap_or(0),
                })
            }
        }
    }

    pub async fn range_total(
        &self,
        chain_id: u64,
        metric: Metric,
        range: TimeRange,
    ) -> Result<RangeTotal, CoreError> {
        let handle = self.catalog.handle(chain_id)?;
        self.with_retry("range_total", || {
            WindowQueryEngine::new(handle.rollups()).range_total(metric, &range)
        })
        .await
    }

    /// The last `days` complete UTC days, oldest first
    pub async fn daily_series(&self, chain_id: u64, days: u32) -> Result<Vec<DailyPoint>, CoreError> {
        let handle = self.catalog.handle(chain_id)?;
        if days == 0 || days > MAX_SERIES_DAYS {
            return Err(CoreError::InvalidRange(format!(
                "days must be between 1 and {}, got {}",
                MAX_SERIES_DAYS, days
            )));
        }

        let now = (self.now_fn)();
        self.with_retry("daily_series", || {
            WindowQueryEngine::new(handle.rollups()).daily_series(days, now)
        })
        .await
    }

    pub async fn chain_pair_breakdown(
        &self,
        chain_id: u64,
        range: TimeRange,
    ) -> Result<Vec<ChainPairRow>, CoreError> {
        let handle = self.catalog.handle(chain_id)?;
        let max_days = self.config.max_pair_range_days;
        self.with_retry("chain_pair_breakdown", || {
            ChainPairAggregator::new(handle.events(), max_days).breakdown(&range)
        })
        .await
    }

    async fn with_retry<T, F>(&self, operation: &str, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Result<T, CoreError>,
    {
        let mut backoff = self.config.query_backoff();
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    log::warn!("⚠️  {} failed: {}", operation, err);
                    if backoff.sleep().await.is_err() {
                        log::error!("❌ {} gave up after {} retries", operation, backoff.attempts());
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
