//! Rollup Store - per-chain minute/day/cumulative tables
//!
//! Tables (one SQLite file per chain):
//! - `minute_buckets`      - UPSERT on minute_ts (tx count, gas, distinct addresses)
//! - `day_buckets`         - UPSERT on day_ts
//! - `cumulative_counters` - one row per minute with activity, running totals inclusive
//! - `minute_addresses`    - working set for the open minute (closed minutes pruned)
//! - `day_addresses`       - exact per-day address sets, never pruned
//! - `rollup_cursor`       - last applied event; written in the same transaction as the rows
//!
//! Writers and readers use separate connections so queries never wait on an
//! in-flight batch.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::CoreError;
use crate::event_log::EventCursor;
use crate::sqlite_pragma::{apply_optimized_pragmas, apply_read_only, lock_conn};
use crate::types::{floor_day, CumulativeCounter, DayBucket, EventKey, MinuteBucket};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS minute_buckets (
    minute_ts               INTEGER PRIMARY KEY,
    tx_count                INTEGER NOT NULL,
    gas_used                INTEGER NOT NULL,
    active_address_count    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS minute_addresses (
    minute_ts   INTEGER NOT NULL,
    address     TEXT NOT NULL,
    PRIMARY KEY (minute_ts, address)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS day_buckets (
    day_ts                  INTEGER PRIMARY KEY,
    total_tx_count          INTEGER NOT NULL,
    total_gas_used          INTEGER NOT NULL,
    active_address_count    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS day_addresses (
    day_ts      INTEGER NOT NULL,
    address     TEXT NOT NULL,
    PRIMARY KEY (day_ts, address)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS cumulative_counters (
    minute_ts               INTEGER PRIMARY KEY,
    cumulative_tx_count     INTEGER NOT NULL,
    cumulative_gas_used     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rollup_cursor (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    last_event_id       INTEGER NOT NULL,
    block_timestamp     INTEGER,
    sequence_in_block   INTEGER,
    updated_at          INTEGER NOT NULL
);
"#;

/// Effect of one minute's worth of events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinuteDelta {
    pub minute_ts: i64,
    pub tx_count: u64,
    pub gas_used: u64,
    pub addresses: BTreeSet<String>,
}

impl MinuteDelta {
    pub fn new(minute_ts: i64) -> Self {
        Self {
            minute_ts,
            ..Default::default()
        }
    }
}

/// Durable rollup tables for one chain
pub struct RollupStore {
    chain_id: u64,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl RollupStore {
    pub fn open(chain_id: u64, db_path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(db_path)?;
        apply_optimized_pragmas(&writer)?;
        writer.execute_batch(SCHEMA)?;

        let reader = Connection::open(db_path)?;
        apply_read_only(&reader)?;

        log::info!("📊 Rollup store for chain {} opened at {}", chain_id, db_path.display());

        Ok(Self {
            chain_id,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Last committed cursor (genesis when nothing was applied yet)
    pub fn cursor(&self) -> Result<EventCursor, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let cursor = conn
            .query_row(
                "SELECT last_event_id, block_timestamp, sequence_in_block FROM rollup_cursor WHERE id = 1",
                [],
                |row| {
                    let ts: Option<i64> = row.get(1)?;
                    let seq: Option<u32> = row.get(2)?;
                    Ok(EventCursor {
                        last_event_id: row.get(0)?,
                        last_key: ts.zip(seq).map(|(block_timestamp, sequence_in_block)| EventKey {
                            block_timestamp,
                            sequence_in_block,
                        }),
                    })
                },
            )
            .optional()?;

        Ok(cursor.unwrap_or_else(EventCursor::genesis))
    }

    /// Apply minute deltas and move the cursor from `expected` to `next`
    ///
    /// `deltas` must be in ascending minute order and may not start before
    /// the newest cumulative row (the open minute). Either every row and
    /// the cursor are committed, or nothing is.
    ///
    /// The write lock is taken up front and the stored cursor re-read under
    /// it. Returns `Ok(false)` without writing when another writer already
    /// moved the cursor past `expected`; the plan is stale and must be
    /// rebuilt from the new cursor.
    pub fn upsert_batch(
        &self,
        expected: &EventCursor,
        deltas: &[MinuteDelta],
        next: &EventCursor,
    ) -> Result<bool, CoreError> {
        let mut conn = lock_conn(&self.writer)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored_event_id: i64 = tx
            .query_row("SELECT last_event_id FROM rollup_cursor WHERE id = 1", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        if stored_event_id != expected.last_event_id {
            log::debug!(
                "⏭️  Chain {}: cursor is at #{}, plan was built from #{}",
                self.chain_id,
                stored_event_id,
                expected.last_event_id
            );
            return Ok(false);
        }

        let (mut open_minute, mut cum_tx, mut cum_gas) = tx
            .query_row(
                "SELECT minute_ts, cumulative_tx_count, cumulative_gas_used
                 FROM cumulative_counters ORDER BY minute_ts DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, get_u64(row, 1)?, get_u64(row, 2)?)),
            )
            .optional()?
            .unwrap_or((i64::MIN, 0, 0));

        {
            let mut insert_minute_addr = tx.prepare_cached(
                "INSERT OR IGNORE INTO minute_addresses (minute_ts, address) VALUES (?1, ?2)",
            )?;
            let mut insert_day_addr = tx.prepare_cached(
                "INSERT OR IGNORE INTO day_addresses (day_ts, address) VALUES (?1, ?2)",
            )?;

            for delta in deltas {
                if delta.minute_ts < open_minute {
                    // Dropping the transaction rolls back everything above
                    return Err(CoreError::InvalidEvent(format!(
                        "chain {}: rollup for minute {} would reopen closed minute {}",
                        self.chain_id, delta.minute_ts, open_minute
                    )));
                }

                // Bucket sums never exceed the running totals, so checking
                // these keeps every stored column in range
                cum_tx = checked_total(cum_tx, delta.tx_count, "tx count", self.chain_id)?;
                cum_gas = checked_total(cum_gas, delta.gas_used, "gas used", self.chain_id)?;

                let day_ts = floor_day(delta.minute_ts);
                let mut new_minute_addrs = 0u64;
                let mut new_day_addrs = 0u64;
                for address in &delta.addresses {
                    new_minute_addrs += insert_minute_addr.execute(params![delta.minute_ts, address])? as u64;
                    new_day_addrs += insert_day_addr.execute(params![day_ts, address])? as u64;
                }

                tx.execute(
                    r#"
                    INSERT INTO minute_buckets (minute_ts, tx_count, gas_used, active_address_count)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(minute_ts) DO UPDATE SET
                        tx_count = tx_count + excluded.tx_count,
                        gas_used = gas_used + excluded.gas_used,
                        active_address_count = active_address_count + excluded.active_address_count
                    "#,
                    params![
                        delta.minute_ts,
                        delta.tx_count as i64,
                        delta.gas_used as i64,
                        new_minute_addrs as i64,
                    ],
                )?;

                tx.execute(
                    r#"
                    INSERT INTO day_buckets (day_ts, total_tx_count, total_gas_used, active_address_count)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(day_ts) DO UPDATE SET
                        total_tx_count = total_tx_count + excluded.total_tx_count,
                        total_gas_used = total_gas_used + excluded.total_gas_used,
                        active_address_count = active_address_count + excluded.active_address_count
                    "#,
                    params![
                        day_ts,
                        delta.tx_count as i64,
                        delta.gas_used as i64,
                        new_day_addrs as i64,
                    ],
                )?;

                tx.execute(
                    r#"
                    INSERT INTO cumulative_counters (minute_ts, cumulative_tx_count, cumulative_gas_used)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(minute_ts) DO UPDATE SET
                        cumulative_tx_count = excluded.cumulative_tx_count,
                        cumulative_gas_used = excluded.cumulative_gas_used
                    "#,
                    params![delta.minute_ts, cum_tx as i64, cum_gas as i64],
                )?;

                open_minute = delta.minute_ts;
            }
        }

        if let Some(last) = deltas.last() {
            tx.execute("DELETE FROM minute_addresses WHERE minute_ts < ?1", [last.minute_ts])?;
        }

        tx.execute(
            r#"
            INSERT INTO rollup_cursor (id, last_event_id, block_timestamp, sequence_in_block, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                last_event_id = excluded.last_event_id,
                block_timestamp = excluded.block_timestamp,
                sequence_in_block = excluded.sequence_in_block,
                updated_at = excluded.updated_at
            "#,
            params![
                next.last_event_id,
                next.last_key.map(|k| k.block_timestamp),
                next.last_key.map(|k| k.sequence_in_block),
                chrono::Utc::now().timestamp(),
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Minute buckets with `from_ts <= minute_ts <= to_ts`
    pub fn minute_range(&self, from_ts: i64, to_ts: i64) -> Result<Vec<MinuteBucket>, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let mut stmt = conn.prepare_cached(
            "SELECT minute_ts, tx_count, gas_used, active_address_count
             FROM minute_buckets WHERE minute_ts BETWEEN ?1 AND ?2 ORDER BY minute_ts ASC",
        )?;
        let rows = stmt.query_map(params![from_ts, to_ts], |row| {
            Ok(MinuteBucket {
                chain_id: self.chain_id,
                minute_ts: row.get(0)?,
                tx_count: get_u64(row, 1)?,
                gas_used: get_u64(row, 2)?,
                active_address_count: get_u64(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Day buckets with `from_ts <= day_ts <= to_ts`
    pub fn day_range(&self, from_ts: i64, to_ts: i64) -> Result<Vec<DayBucket>, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let mut stmt = conn.prepare_cached(
            "SELECT day_ts, active_address_count, total_tx_count, total_gas_used
             FROM day_buckets WHERE day_ts BETWEEN ?1 AND ?2 ORDER BY day_ts ASC",
        )?;
        let rows = stmt.query_map(params![from_ts, to_ts], |row| {
            Ok(DayBucket {
                chain_id: self.chain_id,
                day_ts: row.get(0)?,
                active_address_count: get_u64(row, 1)?,
                total_tx_count: get_u64(row, 2)?,
                total_gas_used: get_u64(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Cumulative rows with `from_ts <= minute_ts <= to_ts`
    pub fn cumulative_range(&self, from_ts: i64, to_ts: i64) -> Result<Vec<CumulativeCounter>, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let mut stmt = conn.prepare_cached(
            "SELECT minute_ts, cumulative_tx_count, cumulative_gas_used
             FROM cumulative_counters WHERE minute_ts BETWEEN ?1 AND ?2 ORDER BY minute_ts ASC",
        )?;
        let rows = stmt.query_map(params![from_ts, to_ts], |row| self.counter_from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Latest cumulative row with `minute_ts <= ts`, or the zero sentinel
    pub fn as_of(&self, ts: i64) -> Result<CumulativeCounter, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let counter = conn
            .query_row(
                "SELECT minute_ts, cumulative_tx_count, cumulative_gas_used
                 FROM cumulative_counters WHERE minute_ts <= ?1
                 ORDER BY minute_ts DESC LIMIT 1",
                [ts],
                |row| self.counter_from_row(row),
            )
            .optional()?;
        Ok(counter.unwrap_or_else(|| CumulativeCounter::zero(self.chain_id)))
    }

    /// Newest cumulative row, or the zero sentinel
    pub fn latest_cumulative(&self) -> Result<CumulativeCounter, CoreError> {
        self.as_of(i64::MAX)
    }

    /// Exact number of distinct addresses active on days `[from_day, to_day]`
    pub fn distinct_addresses_between(&self, from_day: i64, to_day: i64) -> Result<u64, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT address) FROM day_addresses WHERE day_ts BETWEEN ?1 AND ?2",
            params![from_day, to_day],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn counter_from_row(&self, row: &Row<'_>) -> rusqlite::Result<CumulativeCounter> {
        Ok(CumulativeCounter {
            chain_id: self.chain_id,
            minute_ts: row.get(0)?,
            cumulative_tx_count: get_u64(row, 1)?,
            cumulative_gas_used: get_u64(row, 2)?,
        })
    }
}

/// `total + delta`, rejected when it no longer fits a signed 64-bit column
fn checked_total(total: u64, delta: u64, what: &str, chain_id: u64) -> Result<u64, CoreError> {
    total
        .checked_add(delta)
        .filter(|sum| *sum <= i64::MAX as u64)
        .ok_or_else(|| {
            CoreError::InvalidEvent(format!(
                "chain {}: cumulative {} overflows ({} + {})",
                chain_id, what, total, delta
            ))
        })
}

fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}
