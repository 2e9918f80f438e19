//! Bulk import of raw battle logs
//!
//! A log is a JSON array of single-battle records. Records are folded per
//! canonical summary key into one delta each, so a file with thousands of
//! rows becomes a handful of upserts in one transaction.

use crate::aggregate_core::{canonicalize, SummaryDelta, SummaryKey};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One battle as exported by the game client
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BattleRecord {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub season: i32,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub attacking_team_ids: Vec<i64>,
    #[serde(default)]
    pub defending_team_ids: Vec<i64>,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub time: String,
}

/// Values substituted for blank fields of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDefaults {
    pub scope: String,
    pub season: i32,
}

impl ImportDefaults {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            scope: config.default_scope.clone(),
            season: config.default_season,
        }
    }
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            scope: "global".to_string(),
            season: 9,
        }
    }
}

pub fn parse_records(json: &str) -> StoreResult<Vec<BattleRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Unix seconds of a record's `Time`, or `None` when blank or unparseable
///
/// Accepts RFC 3339 and zone-less `YYYY-MM-DDTHH:MM:SS` (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
}

struct Folded {
    attacker: Vec<i64>,
    defender: Vec<i64>,
    wins: i64,
    losses: i64,
    timestamp: i64,
}

/// Fold records into one summary delta per key, in key order
///
/// Records missing either side are skipped. `now` stands in for records
/// without a usable time.
pub fn fold_records(records: &[BattleRecord], defaults: &ImportDefaults, now: i64) -> Vec<SummaryDelta> {
    let mut folded: BTreeMap<SummaryKey, Folded> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in records {
        if record.attacking_team_ids.is_empty() || record.defending_team_ids.is_empty() {
            skipped += 1;
            continue;
        }

        let scope = match record.server.trim().to_lowercase() {
            s if s.is_empty() => defaults.scope.clone(),
            s => s,
        };
        let season = if record.season == 0 {
            defaults.season
        } else {
            record.season
        };
        let timestamp = parse_timestamp(&record.time).unwrap_or(now);

        let attacker = canonicalize(&record.attacking_team_ids);
        let defender = canonicalize(&record.defending_team_ids);
        let key = SummaryKey {
            scope,
            season,
            tag: record.tag.clone(),
            attacker_signature: attacker.signature,
            defender_signature: defender.signature,
        };

        let entry = folded.entry(key).or_insert_with(|| Folded {
            attacker: attacker.units,
            defender: defender.units,
            wins: 0,
            losses: 0,
            timestamp: 0,
        });
        if record.win {
            entry.wins += 1;
        } else {
            entry.losses += 1;
        }
        entry.timestamp = entry.timestamp.max(timestamp);
    }

    if skipped > 0 {
        log::warn!("⚠️  Skipped {} records with an empty team", skipped);
    }

    folded
        .into_iter()
        .map(|(key, f)| SummaryDelta {
            scope: key.scope,
            season: key.season,
            tag: key.tag,
            attacker: f.attacker,
            defender: f.defender,
            wins_delta: f.wins,
            losses_delta: f.losses,
            timestamp: f.timestamp,
        })
        .collect()
}
