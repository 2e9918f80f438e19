//! Re-derive summaries from their surviving detail rows

use super::upsert::{delete_detail, delete_summary, write_summary};
use crate::aggregate_core::{DetailKey, SummaryKey, Tally};
use crate::error::StoreResult;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

const DETAILS_OF_SUMMARY: &str = "scope = ?1 AND season = ?2 AND tag = ?3 \
     AND attacker_signature = ?4 AND defender_signature = ?5";

/// Delete the named detail rows, then rebuild every summary they belonged to
///
/// Returns the number of detail rows actually deleted.
pub(crate) fn delete_details_and_recalc(conn: &Connection, keys: &[DetailKey]) -> StoreResult<usize> {
    let mut deleted = 0;
    let mut touched = BTreeSet::new();

    for key in keys {
        deleted += delete_detail(conn, key)?;
        touched.insert(key.summary.clone());
    }

    for summary in &touched {
        recalc_summary(conn, summary)?;
    }

    log::debug!(
        "Deleted {} detail rows, recalculated {} summaries",
        deleted,
        touched.len()
    );

    Ok(deleted)
}

/// Replace a summary with the fold of its detail rows, or delete it when none survive
pub(crate) fn recalc_summary(conn: &Connection, key: &SummaryKey) -> StoreResult<()> {
    let key_params = params![
        key.scope,
        key.season,
        key.tag,
        key.attacker_signature,
        key.defender_signature
    ];

    let (rows, total_battles, total_wins, last_seen): (i64, i64, i64, i64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(total_battles), 0), COALESCE(SUM(total_wins), 0), \
             COALESCE(MAX(last_seen), 0) FROM arena_details WHERE {}",
            DETAILS_OF_SUMMARY
        ),
        key_params,
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    if rows == 0 || total_battles <= 0 {
        delete_summary(conn, key)?;
        return Ok(());
    }

    // Every detail under one key carries the same canonical rosters
    let (attacker_json, defender_json): (String, String) = conn.query_row(
        &format!(
            "SELECT attacker_roster, defender_roster FROM arena_details WHERE {} LIMIT 1",
            DETAILS_OF_SUMMARY
        ),
        key_params,
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let tally = Tally {
        total_battles,
        total_wins,
        last_seen,
    };
    write_summary(
        conn,
        key,
        &attacker_json,
        &defender_json,
        &tally,
        &tally.scores(),
    )
}
