//! Arena battle statistics
//!
//! Aggregates attacker-vs-defender battle outcomes into per-composition
//! summaries and per-loadout details, scores them for ranking, and serves
//! filtered, paginated listings.

pub mod aggregate_core;
pub mod config;
pub mod error;
pub mod import;
pub mod query;
pub mod retry;
pub mod sqlite_pragma;
pub mod store;
pub mod submissions;

pub use aggregate_core::{
    DetailDelta, DetailKey, DetailRow, LoadoutEntry, SummaryDelta, SummaryKey, SummaryRow,
};
pub use error::{StoreError, StoreResult};
pub use store::{AggregateStore, SqliteAggregateStore};
