//! Shared PRAGMA setup for chain database files

use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::CoreError;

/// Lock a shared connection; a poisoned lock counts as unavailable storage
pub(crate) fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, CoreError> {
    conn.lock()
        .map_err(|_| CoreError::StorageUnavailable("connection lock poisoned".to_string()))
}

/// Apply PRAGMAs used by every writer and reader connection
///
/// WAL lets one writer and any number of readers work on the same file
/// without blocking each other.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("⚠️  SQLite refused WAL mode, running with journal_mode={}", mode);
    }

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -16_000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1_000)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    Ok(())
}

/// Open a connection that can only read (query side of a chain file)
pub fn apply_read_only(conn: &Connection) -> rusqlite::Result<()> {
    apply_optimized_pragmas(conn)?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(())
}
