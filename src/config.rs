//! Store configuration from environment variables

use std::env;
use std::time::Duration;

/// Configuration for the aggregate store and its importers
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `*.sql` schema files
    pub schema_dir: String,

    /// How long a writer waits on another writer's lock before failing
    pub busy_timeout_ms: u64,

    /// Scope used for imported records with a blank server
    pub default_scope: String,

    /// Season used for imported records with season 0
    pub default_season: i32,

    /// Retries the import binary performs on transient storage errors
    pub import_max_retries: u32,
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl StoreConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ARENA_DB_PATH` (default: data/arena.db)
    /// - `ARENA_SCHEMA_DIR` (default: sql)
    /// - `ARENA_BUSY_TIMEOUT_MS` (default: 5000)
    /// - `ARENA_DEFAULT_SCOPE` (default: global)
    /// - `ARENA_DEFAULT_SEASON` (default: 9)
    /// - `ARENA_IMPORT_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("ARENA_DB_PATH").unwrap_or_else(|_| "data/arena.db".to_string()),

            schema_dir: env::var("ARENA_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            busy_timeout_ms: parsed_or("ARENA_BUSY_TIMEOUT_MS", 5_000),

            default_scope: env::var("ARENA_DEFAULT_SCOPE")
                .ok()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "global".to_string()),

            default_season: parsed_or("ARENA_DEFAULT_SEASON", 9),

            import_max_retries: parsed_or("ARENA_IMPORT_MAX_RETRIES", 3),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
