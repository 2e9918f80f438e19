//! Column lists and row mappers for the aggregate tables

use crate::aggregate_core::{DetailKey, DetailRow, SummaryKey, SummaryRow};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;

pub(crate) const SUMMARY_COLUMNS: &str = "scope, season, tag, attacker_signature, defender_signature, \
     attacker_roster, defender_roster, total_battles, total_wins, last_seen, \
     confidence_score, mean_estimate";

pub(crate) const DETAIL_COLUMNS: &str = "scope, season, tag, attacker_signature, defender_signature, \
     loadout_fingerprint, attacker_roster, defender_roster, attacker_loadout, defender_loadout, \
     total_battles, total_wins, last_seen, confidence_score, mean_estimate";

/// Decode a JSON text column
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn summary_key(row: &Row<'_>) -> rusqlite::Result<SummaryKey> {
    Ok(SummaryKey {
        scope: row.get(0)?,
        season: row.get(1)?,
        tag: row.get(2)?,
        attacker_signature: row.get(3)?,
        defender_signature: row.get(4)?,
    })
}

/// Map a row selected with [`SUMMARY_COLUMNS`]
pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        key: summary_key(row)?,
        attacker_roster: json_column(row, 5)?,
        defender_roster: json_column(row, 6)?,
        total_battles: row.get(7)?,
        total_wins: row.get(8)?,
        last_seen: row.get(9)?,
        confidence_score: row.get(10)?,
        mean_estimate: row.get(11)?,
    })
}

/// Map a row selected with [`DETAIL_COLUMNS`]
pub(crate) fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<DetailRow> {
    Ok(DetailRow {
        key: DetailKey {
            summary: summary_key(row)?,
            loadout_fingerprint: row.get(5)?,
        },
        attacker_roster: json_column(row, 6)?,
        defender_roster: json_column(row, 7)?,
        attacker_loadout: json_column(row, 8)?,
        defender_loadout: json_column(row, 9)?,
        total_battles: row.get(10)?,
        total_wins: row.get(11)?,
        last_seen: row.get(12)?,
        confidence_score: row.get(13)?,
        mean_estimate: row.get(14)?,
    })
}
