//! SQLite-backed event log, one database file per chain
//!
//! Uses an autoincrement `id` as the delivery cursor, the same way the
//! incremental trade reader walks its table.

use rusqlite::{params, Connection, ErrorCode, Row};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use super::{EventCursor, EventSource, LoggedEvent};
use crate::error::CoreError;
use crate::sqlite_pragma::{apply_optimized_pragmas, apply_read_only, lock_conn};
use crate::types::{Event, EventKind, Protocol};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    block_timestamp         INTEGER NOT NULL,
    sequence_in_block       INTEGER NOT NULL,
    kind                    TEXT NOT NULL,
    gas_used                INTEGER,
    value                   TEXT,
    from_address            TEXT,
    to_address              TEXT,
    protocol                TEXT,
    counterparty_chain_id   TEXT,
    is_outgoing             INTEGER,
    UNIQUE (block_timestamp, sequence_in_block)
);

CREATE INDEX IF NOT EXISTS idx_events_messages
    ON events (protocol, block_timestamp)
    WHERE kind = 'message';
"#;

const EVENT_COLUMNS: &str = "id, block_timestamp, sequence_in_block, kind, gas_used, value, \
     from_address, to_address, protocol, counterparty_chain_id, is_outgoing";

/// Append-only event log for a single chain
pub struct SqliteEventLog {
    chain_id: u64,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Open (or create) the log file for `chain_id`
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

        log::info!("📥 Event log for chain {} opened at {}", chain_id, db_path.display());

        Ok(Self {
            chain_id,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Append one event; returns its delivery position
    ///
    /// Rejects events for other chains, structurally invalid events and
    /// duplicate `(block_timestamp, sequence_in_block)` keys.
    pub fn append(&self, event: &Event) -> Result<i64, CoreError> {
        if event.chain_id != self.chain_id {
            return Err(CoreError::InvalidEvent(format!(
                "event for chain {} appended to log of chain {}",
                event.chain_id, self.chain_id
            )));
        }
        event.validate()?;

        let conn = lock_conn(&self.writer)?;
        let inserted = conn.execute(
            r#"
            INSERT INTO events (
                block_timestamp, sequence_in_block, kind, gas_used, value,
                from_address, to_address, protocol, counterparty_chain_id, is_outgoing
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                event.block_timestamp,
                event.sequence_in_block,
                event.kind.as_str(),
                event.gas_used.map(|g| g as i64),
                event.value,
                event.from_address,
                event.to_address,
                event.protocol.map(|p| p.as_str()),
                event.counterparty_chain_id,
                event.is_outgoing,
            ],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(CoreError::InvalidEvent(format!(
                    "duplicate event key {} on chain {}",
                    event.key(),
                    self.chain_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn event_count(&self) -> Result<u64, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl EventSource for SqliteEventLog {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn stream_since(&self, cursor: &EventCursor, limit: usize) -> Result<Vec<LoggedEvent>, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
            EVENT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![cursor.last_event_id, limit as i64], |row| {
            logged_event_from_row(self.chain_id, row)
        })?;

        let mut events = Vec::with_capacity(limit.min(1024));
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    fn has_protocol_messages(&self, protocol: Protocol) -> Result<bool, CoreError> {
        let conn = lock_conn(&self.reader)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE kind = 'message' AND protocol = ?1)",
            [protocol.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn for_each_message(
        &self,
        protocol: Protocol,
        from_ts: i64,
        to_ts: i64,
        visit: &mut dyn FnMut(&Event),
    ) -> Result<(), CoreError> {
        let conn = lock_conn(&self.reader)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM events
             WHERE kind = 'message' AND protocol = ?1
               AND block_timestamp BETWEEN ?2 AND ?3
             ORDER BY id ASC",
            EVENT_COLUMNS
        ))?;

        let mut rows = stmt.query(params![protocol.as_str(), from_ts, to_ts])?;
        while let Some(row) = rows.next()? {
            let logged = logged_event_from_row(self.chain_id, row)?;
            visit(&logged.event);
        }
        Ok(())
    }
}

fn logged_event_from_row(chain_id: u64, row: &Row<'_>) -> rusqlite::Result<LoggedEvent> {
    let kind_str: String = row.get(3)?;
    let kind = kind_str
        .parse::<EventKind>()
        .map_err(|e| conversion_error(3, e.to_string()))?;

    let protocol = match row.get::<_, Option<String>>(8)? {
        Some(p) => Some(
            p.parse::<Protocol>()
                .map_err(|e| conversion_error(8, e.to_string()))?,
        ),
        None => None,
    };

    let gas_used: Option<i64> = row.get(4)?;

    Ok(LoggedEvent {
        id: row.get(0)?,
        event: Event {
            chain_id,
            block_timestamp: row.get(1)?,
            sequence_in_block: row.get(2)?,
            kind,
            gas_used: gas_used.map(|g| g as u64),
            value: row.get(5)?,
            from_address: row.get(6)?,
            to_address: row.get(7)?,
            protocol,
            counterparty_chain_id: row.get(9)?,
            is_outgoing: row.get(10)?,
        },
    })
}

fn conversion_error(column: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(CoreError::InvalidEvent(msg)),
    )
}
