//! Loadout normalization and fingerprinting
//!
//! A loadout is sparse on input (only the units the reporter bothered to
//! describe). It is aligned to the canonical roster before fingerprinting so
//! the same equipment always lands on the same detail row.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Equipment of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadoutEntry {
    pub id: i64,
    #[serde(default)]
    pub star: i32,
    #[serde(default)]
    pub weapon_star: i32,
}

impl LoadoutEntry {
    pub fn bare(id: i64) -> Self {
        Self {
            id,
            star: 0,
            weapon_star: 0,
        }
    }

    fn render(&self) -> String {
        format!("{}-{}-{}", self.id, self.star, self.weapon_star)
    }
}

const HASH_SUFFIX_LEN: usize = 8;

/// Align a sparse loadout to `roster` (already canonical)
///
/// One entry per roster member, in roster order. Units absent from `sparse`
/// get zero stars; entries for units not on the roster are dropped. When the
/// same id appears twice in `sparse` the later entry wins.
pub fn normalize(roster: &[i64], sparse: &[LoadoutEntry]) -> Vec<LoadoutEntry> {
    let lookup: HashMap<i64, LoadoutEntry> = sparse.iter().map(|e| (e.id, *e)).collect();

    roster
        .iter()
        .map(|id| lookup.get(id).copied().unwrap_or_else(|| LoadoutEntry::bare(*id)))
        .collect()
}

/// Deterministic identity of an aligned attacker/defender loadout pair
///
/// `101-3-0|102-5-2||201-0-0::1a2b3c4d`: readable prefix, then the first
/// eight hex chars of the SHA-256 of that prefix. Truncated-hash collisions
/// are not detected.
pub fn fingerprint(attacker: &[LoadoutEntry], defender: &[LoadoutEntry]) -> String {
    let render_side = |side: &[LoadoutEntry]| {
        side.iter()
            .map(LoadoutEntry::render)
            .collect::<Vec<_>>()
            .join("|")
    };

    let raw = format!("{}||{}", render_side(attacker), render_side(defender));
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));

    format!("{}::{}", raw, &digest[..HASH_SUFFIX_LEN])
}

/// First entry violating "weapon_star > 0 requires star > 0", if any
pub fn find_invalid(entries: &[LoadoutEntry]) -> Option<&LoadoutEntry> {
    entries.iter().find(|e| e.weapon_star > 0 && e.star <= 0)
}
