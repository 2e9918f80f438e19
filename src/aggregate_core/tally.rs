//! Per-key fold of a win/loss delta into accumulated counts

use super::scorer::Scores;
use crate::error::{StoreError, StoreResult};

/// Accumulated counts of one aggregate row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub total_battles: i64,
    pub total_wins: i64,
    pub last_seen: i64,
}

/// Result of folding one delta into a key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TallyOutcome {
    /// Row must be inserted or replaced with these counts
    Write(Tally, Scores),
    /// Accumulated battles fell to zero or below; the row must not persist
    Remove,
}

impl Tally {
    /// Fold `wins_delta`/`losses_delta` observed at `timestamp` into `existing`
    ///
    /// `last_seen` only advances on a positive total delta carrying a strictly
    /// newer timestamp. Wins are clamped into `0..=total_battles`.
    ///
    /// Counts that would leave the `i64` range are rejected with
    /// [`StoreError::InvalidDelta`] rather than wrapping.
    pub fn apply(
        existing: Option<Tally>,
        wins_delta: i64,
        losses_delta: i64,
        timestamp: i64,
    ) -> StoreResult<TallyOutcome> {
        let delta_total = checked_sum(wins_delta, losses_delta, "delta total")?;

        let (total_battles, raw_wins, last_seen) = match existing {
            Some(current) => {
                let last_seen = if delta_total > 0 && timestamp > current.last_seen {
                    timestamp
                } else {
                    current.last_seen
                };
                (
                    checked_sum(current.total_battles, delta_total, "total_battles")?,
                    checked_sum(current.total_wins, wins_delta, "total_wins")?,
                    last_seen,
                )
            }
            None => (delta_total, wins_delta, timestamp),
        };

        if total_battles <= 0 {
            return Ok(TallyOutcome::Remove);
        }

        let tally = Tally {
            total_battles,
            total_wins: raw_wins.clamp(0, total_battles),
            last_seen,
        };
        Ok(TallyOutcome::Write(tally, tally.scores()))
    }

    pub fn scores(&self) -> Scores {
        Scores::compute(self.total_wins, self.total_battles)
    }
}

fn checked_sum(a: i64, b: i64, what: &str) -> StoreResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| StoreError::InvalidDelta(format!("{} overflows ({} + {})", what, a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(outcome: StoreResult<TallyOutcome>) -> Tally {
        match outcome.unwrap() {
            TallyOutcome::Write(tally, _) => tally,
            TallyOutcome::Remove => panic!("expected a write, got removal"),
        }
    }

    #[test]
    fn test_first_delta_creates() {
        let tally = written(Tally::apply(None, 3, 1, 1_700_000_000));
        assert_eq!(
            tally,
            Tally {
                total_battles: 4,
                total_wins: 3,
                last_seen: 1_700_000_000
            }
        );
    }

    #[test]
    fn test_negation_removes() {
        let tally = written(Tally::apply(None, 3, 1, 100));
        assert_eq!(Tally::apply(Some(tally), -3, -1, 200).unwrap(), TallyOutcome::Remove);
    }

    #[test]
    fn test_negative_first_delta_removes() {
        assert_eq!(Tally::apply(None, -1, 0, 100).unwrap(), TallyOutcome::Remove);
    }

    #[test]
    fn test_wins_are_clamped() {
        let base = Tally {
            total_battles: 4,
            total_wins: 1,
            last_seen: 10,
        };

        let low = written(Tally::apply(Some(base), -3, 1, 20));
        assert_eq!(low.total_battles, 2);
        assert_eq!(low.total_wins, 0);

        let high = written(Tally::apply(Some(base), 6, -4, 20));
        assert_eq!(high.total_battles, 6);
        assert_eq!(high.total_wins, 6);
    }

    #[test]
    fn test_last_seen_rules() {
        let base = Tally {
            total_battles: 5,
            total_wins: 2,
            last_seen: 1_000,
        };

        // newer positive delta advances
        assert_eq!(written(Tally::apply(Some(base), 1, 0, 2_000)).last_seen, 2_000);
        // stale positive delta does not
        assert_eq!(written(Tally::apply(Some(base), 1, 0, 500)).last_seen, 1_000);
        // equal timestamp does not
        assert_eq!(written(Tally::apply(Some(base), 0, 1, 1_000)).last_seen, 1_000);
        // negative delta never advances, even when newer
        assert_eq!(written(Tally::apply(Some(base), -1, 0, 9_000)).last_seen, 1_000);
    }

    #[test]
    fn test_scores_follow_counts() {
        match Tally::apply(None, 3, 1, 0).unwrap() {
            TallyOutcome::Write(tally, scores) => {
                assert_eq!(scores, Scores::compute(3, 4));
                assert_eq!(tally.scores(), scores);
            }
            TallyOutcome::Remove => panic!("expected a write"),
        }
    }

    #[test]
    fn test_counter_overflow_is_rejected() {
        let full = Tally {
            total_battles: i64::MAX,
            total_wins: i64::MAX,
            last_seen: 10,
        };
        let result = Tally::apply(Some(full), 1, 0, 20);
        assert!(matches!(result, Err(StoreError::InvalidDelta(_))));

        let result = Tally::apply(None, i64::MAX, 1, 20);
        assert!(matches!(result, Err(StoreError::InvalidDelta(_))));

        // Opposite signs near the edges are fine
        let near = written(Tally::apply(Some(full), -1, 0, 20));
        assert_eq!(near.total_battles, i64::MAX - 1);
    }
}
