//! Arena Import Binary - bulk-load battle logs into the aggregate store
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin arena_import -- battles.json [--scope jp] [--season 12]
//! ```
//!
//! ## Environment Variables
//!
//! - ARENA_DB_PATH - SQLite database path (default: data/arena.db)
//! - ARENA_SCHEMA_DIR - Schema directory (default: sql)
//! - ARENA_BUSY_TIMEOUT_MS - Lock wait per write (default: 5000)
//! - ARENA_DEFAULT_SCOPE - Scope for records with a blank server (default: global)
//! - ARENA_DEFAULT_SEASON - Season for records with season 0 (default: 9)
//! - ARENA_IMPORT_MAX_RETRIES - Retries on a busy database (default: 3)
//! - RUST_LOG - Logging level (optional, default: info)

use arena_stats::config::StoreConfig;
use arena_stats::import::{fold_records, parse_records, ImportDefaults};
use arena_stats::retry::{retry_transient, ExponentialBackoff};
use arena_stats::store::{AggregateStore, SqliteAggregateStore};
use chrono::Utc;
use std::env;
use std::path::PathBuf;

struct ImportArgs {
    input: PathBuf,
    scope: Option<String>,
    season: Option<i32>,
}

fn parse_args() -> Result<ImportArgs, Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let mut input = None;
    let mut scope = None;
    let mut season = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scope" => scope = args.next(),
            "--season" => {
                season = Some(args.next().ok_or("--season needs a value")?.parse()?);
            }
            _ => input = Some(PathBuf::from(arg)),
        }
    }

    Ok(ImportArgs {
        input: input.ok_or("usage: arena_import <battles.json> [--scope S] [--season N]")?,
        scope,
        season,
    })
}

fn logger_builder() -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.target(env_logger::Target::Stderr);
    builder
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Must precede logger init: .env may set RUST_LOG
    dotenv::dotenv().ok();
    logger_builder().init();

    let config = StoreConfig::from_env();
    let args = parse_args()?;

    let mut defaults = ImportDefaults::from_config(&config);
    if let Some(scope) = args.scope {
        defaults.scope = scope.trim().to_lowercase();
    }
    if let Some(season) = args.season {
        defaults.season = season;
    }

    log::info!("🚀 Starting arena import");
    log::info!("   Input: {}", args.input.display());
    log::info!("   Database: {}", config.db_path);
    log::info!("   Defaults: scope={} season={}", defaults.scope, defaults.season);

    let raw = tokio::fs::read_to_string(&args.input).await?;
    let records = parse_records(&raw)?;
    let deltas = fold_records(&records, &defaults, Utc::now().timestamp());

    if deltas.is_empty() {
        log::info!("No valid data found to import.");
        return Ok(());
    }

    let store = SqliteAggregateStore::open(&config)?;
    let mut backoff = ExponentialBackoff::new(100, 2_000, config.import_max_retries);
    let applied = retry_transient(&mut backoff, || store.apply_summary_deltas(&deltas)).await?;

    log::info!(
        "✅ Processed {} records, updated/created {} summaries",
        records.len(),
        applied
    );
    Ok(())
}
