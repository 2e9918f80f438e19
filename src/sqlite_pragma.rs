//! SQLite connection tuning shared by every store connection

use rusqlite::{Connection, Result as SqliteResult};
use std::time::Duration;

/// Apply WAL journaling, relaxed fsync and a busy timeout
///
/// Returns the journal mode SQLite actually selected (`wal` for files,
/// `memory` for in-memory databases).
pub fn apply_optimized_pragmas(conn: &Connection, busy_timeout: Duration) -> SqliteResult<String> {
    conn.busy_timeout(busy_timeout)?;

    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    log::debug!(
        "SQLite pragmas applied (journal_mode={}, busy_timeout={}ms)",
        journal_mode,
        busy_timeout.as_millis()
    );

    Ok(journal_mode)
}
