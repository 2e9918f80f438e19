//! Transactional persistence of summary and detail aggregates

pub mod db;
pub(crate) mod recalc;
pub(crate) mod rows;
pub(crate) mod upsert;

pub use db::{run_schema_migrations, AggregateStore, SqliteAggregateStore};
