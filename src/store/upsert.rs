//! Per-delta read-modify-write against an open write transaction
//!
//! Callers hold a `BEGIN IMMEDIATE` transaction, so the read of the current
//! counts and the write-back below cannot interleave with another writer.

use crate::aggregate_core::{
    DetailDelta, DetailKey, ResolvedDetail, ResolvedSummary, Scores, SummaryDelta, SummaryKey,
    Tally, TallyOutcome,
};
use crate::error::StoreResult;
use rusqlite::{params, Connection, OptionalExtension};

const SUMMARY_KEY_PREDICATE: &str = "scope = ?1 AND season = ?2 AND tag = ?3 \
     AND attacker_signature = ?4 AND defender_signature = ?5";

const DETAIL_KEY_PREDICATE: &str = "scope = ?1 AND season = ?2 AND tag = ?3 \
     AND attacker_signature = ?4 AND defender_signature = ?5 AND loadout_fingerprint = ?6";

fn read_summary_tally(conn: &Connection, key: &SummaryKey) -> StoreResult<Option<Tally>> {
    let sql = format!(
        "SELECT total_battles, total_wins, last_seen FROM arena_summaries WHERE {}",
        SUMMARY_KEY_PREDICATE
    );
    let tally = conn
        .query_row(
            &sql,
            params![
                key.scope,
                key.season,
                key.tag,
                key.attacker_signature,
                key.defender_signature
            ],
            |row| {
                Ok(Tally {
                    total_battles: row.get(0)?,
                    total_wins: row.get(1)?,
                    last_seen: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(tally)
}

fn read_detail_tally(conn: &Connection, key: &DetailKey) -> StoreResult<Option<Tally>> {
    let sql = format!(
        "SELECT total_battles, total_wins, last_seen FROM arena_details WHERE {}",
        DETAIL_KEY_PREDICATE
    );
    let s = &key.summary;
    let tally = conn
        .query_row(
            &sql,
            params![
                s.scope,
                s.season,
                s.tag,
                s.attacker_signature,
                s.defender_signature,
                key.loadout_fingerprint
            ],
            |row| {
                Ok(Tally {
                    total_battles: row.get(0)?,
                    total_wins: row.get(1)?,
                    last_seen: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(tally)
}

/// Remove one summary row; 0 when nothing matched
pub(crate) fn delete_summary(conn: &Connection, key: &SummaryKey) -> StoreResult<usize> {
    let sql = format!("DELETE FROM arena_summaries WHERE {}", SUMMARY_KEY_PREDICATE);
    let affected = conn.execute(
        &sql,
        params![
            key.scope,
            key.season,
            key.tag,
            key.attacker_signature,
            key.defender_signature
        ],
    )?;
    Ok(affected)
}

/// Remove one detail row; 0 when nothing matched
pub(crate) fn delete_detail(conn: &Connection, key: &DetailKey) -> StoreResult<usize> {
    let sql = format!("DELETE FROM arena_details WHERE {}", DETAIL_KEY_PREDICATE);
    let s = &key.summary;
    let affected = conn.execute(
        &sql,
        params![
            s.scope,
            s.season,
            s.tag,
            s.attacker_signature,
            s.defender_signature,
            key.loadout_fingerprint
        ],
    )?;
    Ok(affected)
}

/// Insert or replace a summary row
///
/// Rosters are passed as their JSON text so recalculation can reuse a
/// detail row's stored rosters verbatim.
pub(crate) fn write_summary(
    conn: &Connection,
    key: &SummaryKey,
    attacker_roster_json: &str,
    defender_roster_json: &str,
    tally: &Tally,
    scores: &Scores,
) -> StoreResult<()> {
    conn.execute(
        r#"
        INSERT INTO arena_summaries (
            scope, season, tag, attacker_signature, defender_signature,
            attacker_roster, defender_roster,
            total_battles, total_wins, last_seen,
            confidence_score, mean_estimate
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(scope, season, tag, attacker_signature, defender_signature) DO UPDATE SET
            attacker_roster = excluded.attacker_roster,
            defender_roster = excluded.defender_roster,
            total_battles = excluded.total_battles,
            total_wins = excluded.total_wins,
            last_seen = excluded.last_seen,
            confidence_score = excluded.confidence_score,
            mean_estimate = excluded.mean_estimate
        "#,
        params![
            key.scope,
            key.season,
            key.tag,
            key.attacker_signature,
            key.defender_signature,
            attacker_roster_json,
            defender_roster_json,
            tally.total_battles,
            tally.total_wins,
            tally.last_seen,
            scores.confidence_score,
            scores.mean_estimate,
        ],
    )?;
    Ok(())
}

fn write_detail(
    conn: &Connection,
    resolved: &ResolvedDetail,
    tally: &Tally,
    scores: &Scores,
) -> StoreResult<()> {
    let s = &resolved.key.summary;
    conn.execute(
        r#"
        INSERT INTO arena_details (
            scope, season, tag, attacker_signature, defender_signature, loadout_fingerprint,
            attacker_roster, defender_roster, attacker_loadout, defender_loadout,
            total_battles, total_wins, last_seen,
            confidence_score, mean_estimate
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(scope, season, tag, attacker_signature, defender_signature, loadout_fingerprint)
        DO UPDATE SET
            attacker_roster = excluded.attacker_roster,
            defender_roster = excluded.defender_roster,
            attacker_loadout = excluded.attacker_loadout,
            defender_loadout = excluded.defender_loadout,
            total_battles = excluded.total_battles,
            total_wins = excluded.total_wins,
            last_seen = excluded.last_seen,
            confidence_score = excluded.confidence_score,
            mean_estimate = excluded.mean_estimate
        "#,
        params![
            s.scope,
            s.season,
            s.tag,
            s.attacker_signature,
            s.defender_signature,
            resolved.key.loadout_fingerprint,
            serde_json::to_string(&resolved.attacker.units)?,
            serde_json::to_string(&resolved.defender.units)?,
            serde_json::to_string(&resolved.attacker_loadout)?,
            serde_json::to_string(&resolved.defender_loadout)?,
            tally.total_battles,
            tally.total_wins,
            tally.last_seen,
            scores.confidence_score,
            scores.mean_estimate,
        ],
    )?;
    Ok(())
}

/// Fold one roster-level delta into its summary row
///
/// Returns false when the delta was a no-op (zero total) and was skipped.
pub(crate) fn apply_summary_delta(conn: &Connection, delta: &SummaryDelta) -> StoreResult<bool> {
    let ResolvedSummary {
        key,
        attacker,
        defender,
    } = delta.resolve();

    if delta.total_delta() == Some(0) {
        return Ok(false);
    }

    let existing = read_summary_tally(conn, &key)?;
    match Tally::apply(existing, delta.wins_delta, delta.losses_delta, delta.timestamp)? {
        TallyOutcome::Remove => {
            if existing.is_some() {
                delete_summary(conn, &key)?;
                log::debug!(
                    "Summary removed: {} vs {} ({}/{}/{:?})",
                    key.attacker_signature,
                    key.defender_signature,
                    key.scope,
                    key.season,
                    key.tag
                );
            }
        }
        TallyOutcome::Write(tally, scores) => {
            write_summary(
                conn,
                &key,
                &serde_json::to_string(&attacker.units)?,
                &serde_json::to_string(&defender.units)?,
                &tally,
                &scores,
            )?;
        }
    }

    Ok(true)
}

/// Fold one loadout-level delta into its detail row
///
/// Returns false when the delta was a no-op (zero total) and was skipped.
pub(crate) fn apply_detail_delta(conn: &Connection, delta: &DetailDelta) -> StoreResult<bool> {
    let resolved = delta.resolve();

    if delta.base.total_delta() == Some(0) {
        return Ok(false);
    }

    let existing = read_detail_tally(conn, &resolved.key)?;
    match Tally::apply(
        existing,
        delta.base.wins_delta,
        delta.base.losses_delta,
        delta.base.timestamp,
    )? {
        TallyOutcome::Remove => {
            if existing.is_some() {
                delete_detail(conn, &resolved.key)?;
                log::debug!("Detail removed: {}", resolved.key.loadout_fingerprint);
            }
        }
        TallyOutcome::Write(tally, scores) => {
            write_detail(conn, &resolved, &tally, &scores)?;
        }
    }

    Ok(true)
}
