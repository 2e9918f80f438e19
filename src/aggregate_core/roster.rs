//! Roster canonicalization
//!
//! Two reports of the same team entered in a different order must collapse to
//! one aggregate key. Units whose id starts with the digit `2` are the special
//! class and are sorted; every other unit keeps its reported relative order
//! and comes first.

use serde::{Deserialize, Serialize};

/// Canonical form of one side of a battle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalRoster {
    pub units: Vec<i64>,
    pub signature: String,
}

fn is_special(unit_id: i64) -> bool {
    unit_id.to_string().starts_with('2')
}

/// Canonicalize a raw roster into its ordered unit list and signature
pub fn canonicalize(roster: &[i64]) -> CanonicalRoster {
    let (mut units, mut specials): (Vec<i64>, Vec<i64>) =
        roster.iter().copied().partition(|id| !is_special(*id));

    specials.sort_unstable();
    units.extend(specials);

    let signature = signature_of(&units);
    CanonicalRoster { units, signature }
}

/// Render an already-canonical roster as its signature string
pub fn signature_of(units: &[i64]) -> String {
    units
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_roster() {
        let canonical = canonicalize(&[101, 205, 103, 202]);
        assert_eq!(canonical.units, vec![101, 103, 202, 205]);
        assert_eq!(canonical.signature, "101,103,202,205");
    }

    #[test]
    fn test_standard_order_is_preserved() {
        let canonical = canonicalize(&[10045, 10002, 20011, 10031, 20003]);
        assert_eq!(canonical.units, vec![10045, 10002, 10031, 20003, 20011]);
        assert_eq!(canonical.signature, "10045,10002,10031,20003,20011");
    }

    #[test]
    fn test_empty_roster() {
        let canonical = canonicalize(&[]);
        assert!(canonical.units.is_empty());
        assert_eq!(canonical.signature, "");
    }

    #[test]
    fn test_idempotent() {
        let inputs: [&[i64]; 4] = [
            &[205, 101, 202, 103],
            &[3, 2, 1],
            &[29, 2, 200, 21],
            &[-2, 7, 2],
        ];
        for input in inputs {
            let once = canonicalize(input);
            let twice = canonicalize(&once.units);
            assert_eq!(once, twice, "canonicalize not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_special_class_order_independent() {
        let a = canonicalize(&[101, 205, 102, 202]);
        let b = canonicalize(&[101, 202, 102, 205]);
        assert_eq!(a, b);

        // Standard-class order still distinguishes rosters
        let c = canonicalize(&[102, 205, 101, 202]);
        assert_ne!(a.signature, c.signature);
    }

    #[test]
    fn test_negative_ids_are_standard() {
        // "-2" does not start with the digit 2
        let canonical = canonicalize(&[22, -2, 5]);
        assert_eq!(canonical.units, vec![-2, 5, 22]);
    }
}
