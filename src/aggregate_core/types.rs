//! Keys, deltas and persisted rows of the two aggregate layers

use super::loadout::{self, LoadoutEntry};
use super::roster::{self, CanonicalRoster};
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Identity of a summary aggregate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub scope: String,
    pub season: i32,
    pub tag: String,
    pub attacker_signature: String,
    pub defender_signature: String,
}

/// Identity of a detail aggregate: its summary key plus a loadout fingerprint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DetailKey {
    #[serde(flatten)]
    pub summary: SummaryKey,
    pub loadout_fingerprint: String,
}

/// Roster-level change to fold into a summary aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDelta {
    pub scope: String,
    pub season: i32,
    #[serde(default)]
    pub tag: String,
    pub attacker: Vec<i64>,
    pub defender: Vec<i64>,
    pub wins_delta: i64,
    pub losses_delta: i64,
    pub timestamp: i64,
}

/// Roster-plus-loadout change to fold into a detail aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailDelta {
    #[serde(flatten)]
    pub base: SummaryDelta,
    #[serde(default)]
    pub attacker_loadout: Vec<LoadoutEntry>,
    #[serde(default)]
    pub defender_loadout: Vec<LoadoutEntry>,
}

/// A summary delta after canonicalization, ready for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSummary {
    pub key: SummaryKey,
    pub attacker: CanonicalRoster,
    pub defender: CanonicalRoster,
}

/// A detail delta after canonicalization and loadout alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDetail {
    pub key: DetailKey,
    pub attacker: CanonicalRoster,
    pub defender: CanonicalRoster,
    pub attacker_loadout: Vec<LoadoutEntry>,
    pub defender_loadout: Vec<LoadoutEntry>,
}

impl SummaryDelta {
    /// Battles this delta adds; `None` when the sum leaves the `i64` range
    pub fn total_delta(&self) -> Option<i64> {
        self.wins_delta.checked_add(self.losses_delta)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.attacker.is_empty() || self.defender.is_empty() {
            return Err(StoreError::InvalidDelta(format!(
                "rosters cannot be empty (scope={} season={} tag={:?})",
                self.scope, self.season, self.tag
            )));
        }
        if self.total_delta().is_none() {
            return Err(StoreError::InvalidDelta(format!(
                "wins_delta {} + losses_delta {} overflows",
                self.wins_delta, self.losses_delta
            )));
        }
        Ok(())
    }

    pub fn resolve(&self) -> ResolvedSummary {
        let attacker = roster::canonicalize(&self.attacker);
        let defender = roster::canonicalize(&self.defender);
        let key = SummaryKey {
            scope: self.scope.clone(),
            season: self.season,
            tag: self.tag.clone(),
            attacker_signature: attacker.signature.clone(),
            defender_signature: defender.signature.clone(),
        };
        ResolvedSummary {
            key,
            attacker,
            defender,
        }
    }
}

impl DetailDelta {
    pub fn validate(&self) -> StoreResult<()> {
        self.base.validate()?;
        let sides = [&self.attacker_loadout, &self.defender_loadout];
        if let Some(bad) = sides.iter().find_map(|side| loadout::find_invalid(side)) {
            return Err(StoreError::InvalidDelta(format!(
                "unit {} has weapon_star {} but star {}: weapon_star > 0 requires star > 0",
                bad.id, bad.weapon_star, bad.star
            )));
        }
        Ok(())
    }

    pub fn resolve(&self) -> ResolvedDetail {
        let ResolvedSummary {
            key,
            attacker,
            defender,
        } = self.base.resolve();

        let attacker_loadout = loadout::normalize(&attacker.units, &self.attacker_loadout);
        let defender_loadout = loadout::normalize(&defender.units, &self.defender_loadout);
        let loadout_fingerprint = loadout::fingerprint(&attacker_loadout, &defender_loadout);

        ResolvedDetail {
            key: DetailKey {
                summary: key,
                loadout_fingerprint,
            },
            attacker,
            defender,
            attacker_loadout,
            defender_loadout,
        }
    }
}

/// Persisted summary aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(flatten)]
    pub key: SummaryKey,
    pub attacker_roster: Vec<i64>,
    pub defender_roster: Vec<i64>,
    pub total_battles: i64,
    pub total_wins: i64,
    pub last_seen: i64,
    pub confidence_score: f64,
    pub mean_estimate: f64,
}

/// Persisted detail aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    #[serde(flatten)]
    pub key: DetailKey,
    pub attacker_roster: Vec<i64>,
    pub defender_roster: Vec<i64>,
    pub attacker_loadout: Vec<LoadoutEntry>,
    pub defender_loadout: Vec<LoadoutEntry>,
    pub total_battles: i64,
    pub total_wins: i64,
    pub last_seen: i64,
    pub confidence_score: f64,
    pub mean_estimate: f64,
}

fn raw_win_rate(wins: i64, total: i64) -> f64 {
    if total > 0 {
        wins as f64 / total as f64
    } else {
        0.0
    }
}

impl SummaryRow {
    pub fn losses(&self) -> i64 {
        self.total_battles - self.total_wins
    }

    pub fn win_rate(&self) -> f64 {
        raw_win_rate(self.total_wins, self.total_battles)
    }
}

impl DetailRow {
    pub fn losses(&self) -> i64 {
        self.total_battles - self.total_wins
    }

    pub fn win_rate(&self) -> f64 {
        raw_win_rate(self.total_wins, self.total_battles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(attacker: Vec<i64>, defender: Vec<i64>) -> SummaryDelta {
        SummaryDelta {
            scope: "global".to_string(),
            season: 9,
            tag: String::new(),
            attacker,
            defender,
            wins_delta: 2,
            losses_delta: 1,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_resolve_canonicalizes_key() {
        let resolved = delta(vec![101, 205, 103, 202], vec![20008, 10005]).resolve();
        assert_eq!(resolved.key.attacker_signature, "101,103,202,205");
        assert_eq!(resolved.key.defender_signature, "10005,20008");
        assert_eq!(resolved.attacker.units, vec![101, 103, 202, 205]);
    }

    #[test]
    fn test_empty_roster_rejected() {
        assert!(matches!(
            delta(vec![], vec![1]).validate(),
            Err(StoreError::InvalidDelta(_))
        ));
        assert!(delta(vec![1], vec![2]).validate().is_ok());
    }

    #[test]
    fn test_invalid_loadout_rejected() {
        let detail = DetailDelta {
            base: delta(vec![101], vec![201]),
            attacker_loadout: vec![],
            defender_loadout: vec![LoadoutEntry {
                id: 201,
                star: 0,
                weapon_star: 1,
            }],
        };
        assert!(matches!(detail.validate(), Err(StoreError::InvalidDelta(_))));
    }

    #[test]
    fn test_detail_resolve_aligns_loadout() {
        let detail = DetailDelta {
            base: delta(vec![205, 101], vec![201]),
            attacker_loadout: vec![LoadoutEntry {
                id: 205,
                star: 3,
                weapon_star: 1,
            }],
            defender_loadout: vec![],
        };

        let resolved = detail.resolve();
        assert_eq!(
            resolved.attacker_loadout,
            vec![
                LoadoutEntry::bare(101),
                LoadoutEntry {
                    id: 205,
                    star: 3,
                    weapon_star: 1
                }
            ]
        );
        assert!(resolved
            .key
            .loadout_fingerprint
            .starts_with("101-0-0|205-3-1||201-0-0::"));
        assert_eq!(resolved.key.summary, detail.base.resolve().key);
    }

    #[test]
    fn test_overflowing_delta_rejected() {
        let mut d = delta(vec![1], vec![2]);
        d.wins_delta = i64::MAX;
        d.losses_delta = 1;
        assert_eq!(d.total_delta(), None);
        assert!(matches!(d.validate(), Err(StoreError::InvalidDelta(_))));

        d.losses_delta = -1;
        assert_eq!(d.total_delta(), Some(i64::MAX - 1));
        assert!(d.validate().is_ok());
    }
}
