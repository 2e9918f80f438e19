//! Aggregate store over SQLite
//!
//! Tables (see `/sql/` directory):
//! - `arena_summaries` - UPSERT on (scope, season, tag, attacker, defender)
//! - `arena_details` - UPSERT on the summary key + loadout fingerprint
//! - `arena_submissions` - review queue, see [`crate::submissions`]
//!
//! Every mutation batch runs in a single `BEGIN IMMEDIATE` transaction. SQLite
//! grants the write lock when the transaction starts, so two writers touching
//! the same key are serialized and a failed delta rolls back the whole batch.

use super::{recalc, upsert};
use crate::aggregate_core::{
    DetailDelta, DetailKey, DetailRow, SummaryDelta, SummaryKey, SummaryRow,
};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::query::listing::{self, DetailListFilter, ListFilter, Page, PageRequest, Sort};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Entry points consumed by request handlers
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Fold roster-level deltas into summary rows, all-or-nothing
    ///
    /// Returns the number of deltas applied (zero-total deltas are skipped
    /// and not counted).
    async fn apply_summary_deltas(&self, deltas: &[SummaryDelta]) -> StoreResult<usize>;

    /// Fold loadout-level deltas into detail rows, all-or-nothing
    async fn apply_detail_deltas(&self, deltas: &[DetailDelta]) -> StoreResult<usize>;

    /// Delete detail rows and rebuild their summaries from the survivors
    ///
    /// Returns the number of detail rows deleted.
    async fn delete_details_and_recalc(&self, keys: &[DetailKey]) -> StoreResult<usize>;

    /// Remove one summary row without touching its details
    async fn delete_summary(&self, key: &SummaryKey) -> StoreResult<usize>;

    /// Remove several summary rows in one transaction
    ///
    /// Returns the number of rows actually deleted; missing keys are skipped.
    async fn delete_summaries(&self, keys: &[SummaryKey]) -> StoreResult<usize>;

    /// Distinct seasons with summaries in `scope`, newest first
    async fn list_seasons(&self, scope: Option<&str>) -> StoreResult<Vec<i32>>;

    async fn list_summaries(
        &self,
        filter: &ListFilter,
        page: PageRequest,
        sort: Sort,
    ) -> StoreResult<Page<SummaryRow>>;

    async fn list_details(
        &self,
        filter: &DetailListFilter,
        page: PageRequest,
        sort: Sort,
    ) -> StoreResult<Page<DetailRow>>;
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir` and executes them in file-name
/// order (`01_`, `02_`, ...). Every file must be idempotent
/// (`IF NOT EXISTS`).
pub fn run_schema_migrations(conn: &Connection, schema_dir: impl AsRef<Path>) -> StoreResult<()> {
    let schema_path = schema_dir.as_ref();

    if !schema_path.is_dir() {
        return Err(StoreError::Schema(format!(
            "Schema directory not found: {}",
            schema_path.display()
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_path.display());

    for entry in sql_files {
        let filename = entry.file_name().to_string_lossy().into_owned();
        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(entry.path())?;
        conn.execute_batch(&sql_content)
            .map_err(|e| StoreError::Schema(format!("{}: {}", filename, e)))?;
    }

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

/// SQLite implementation of [`AggregateStore`]
///
/// One connection per store; clones share it. Independent stores opened on
/// the same file coordinate through SQLite's own locking and busy timeout.
#[derive(Clone)]
pub struct SqliteAggregateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAggregateStore {
    /// Open the configured database, creating it and its schema if needed
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let store = Self::open_path(&config.db_path, config.busy_timeout())?;
        store.migrate(&config.schema_dir)?;
        Ok(store)
    }

    /// Open a database file without running migrations
    pub fn open_path(db_path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn, busy_timeout)?;

        log::info!("✅ Aggregate store opened: {}", db_path.display());
        Ok(Self::from_connection(conn))
    }

    /// In-memory database, mostly for tests and dry runs
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_optimized_pragmas(&conn, Duration::from_secs(5))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn migrate(&self, schema_dir: impl AsRef<Path>) -> StoreResult<()> {
        let conn = self.lock()?;
        run_schema_migrations(&conn, schema_dir)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run `f` inside one immediate write transaction
    ///
    /// Commits when `f` succeeds; any error drops the transaction, which
    /// rolls every statement of the batch back.
    pub(crate) fn with_write_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }
}

/// Apply a summary batch inside an open transaction
pub(crate) fn apply_summary_batch(tx: &Connection, deltas: &[SummaryDelta]) -> StoreResult<usize> {
    let mut applied = 0;
    for delta in deltas {
        if upsert::apply_summary_delta(tx, delta)? {
            applied += 1;
        }
    }
    Ok(applied)
}

/// Apply a detail batch inside an open transaction
pub(crate) fn apply_detail_batch(tx: &Connection, deltas: &[DetailDelta]) -> StoreResult<usize> {
    let mut applied = 0;
    for delta in deltas {
        if upsert::apply_detail_delta(tx, delta)? {
            applied += 1;
        }
    }
    Ok(applied)
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    async fn apply_summary_deltas(&self, deltas: &[SummaryDelta]) -> StoreResult<usize> {
        for delta in deltas {
            delta.validate()?;
        }

        let applied = self.with_write_tx(|tx| apply_summary_batch(tx, deltas))?;
        log::debug!("Summary batch committed: {}/{} applied", applied, deltas.len());
        Ok(applied)
    }

    async fn apply_detail_deltas(&self, deltas: &[DetailDelta]) -> StoreResult<usize> {
        for delta in deltas {
            delta.validate()?;
        }

        let applied = self.with_write_tx(|tx| apply_detail_batch(tx, deltas))?;
        log::debug!("Detail batch committed: {}/{} applied", applied, deltas.len());
        Ok(applied)
    }

    async fn delete_details_and_recalc(&self, keys: &[DetailKey]) -> StoreResult<usize> {
        self.with_write_tx(|tx| recalc::delete_details_and_recalc(tx, keys))
    }

    async fn delete_summary(&self, key: &SummaryKey) -> StoreResult<usize> {
        self.with_write_tx(|tx| upsert::delete_summary(tx, key))
    }

    async fn delete_summaries(&self, keys: &[SummaryKey]) -> StoreResult<usize> {
        let deleted = self.with_write_tx(|tx| {
            let mut deleted = 0;
            for key in keys {
                deleted += upsert::delete_summary(tx, key)?;
            }
            Ok(deleted)
        })?;
        log::debug!("Batch delete removed {}/{} summaries", deleted, keys.len());
        Ok(deleted)
    }

    async fn list_seasons(&self, scope: Option<&str>) -> StoreResult<Vec<i32>> {
        self.with_conn(|conn| listing::list_seasons(conn, scope))
    }

    async fn list_summaries(
        &self,
        filter: &ListFilter,
        page: PageRequest,
        sort: Sort,
    ) -> StoreResult<Page<SummaryRow>> {
        self.with_conn(|conn| listing::list_summaries(conn, filter, page, sort))
    }

    async fn list_details(
        &self,
        filter: &DetailListFilter,
        page: PageRequest,
        sort: Sort,
    ) -> StoreResult<Page<DetailRow>> {
        self.with_conn(|conn| listing::list_details(conn, filter, page, sort))
    }
}
