//! Confidence scoring for win/battle counts

use serde::{Deserialize, Serialize};

/// z for a two-sided 95% interval
const Z_95: f64 = 1.96;

/// Beta(1, 1) prior
const PRIOR_ALPHA: f64 = 1.0;
const PRIOR_BETA: f64 = 1.0;

/// Both statistics for one aggregate row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// Wilson lower bound, the primary ranking score
    pub confidence_score: f64,
    /// Posterior mean, the secondary displayed rate
    pub mean_estimate: f64,
}

impl Scores {
    pub fn compute(wins: i64, total: i64) -> Self {
        Self {
            confidence_score: wilson_lower_bound(wins, total),
            mean_estimate: posterior_mean(wins, total),
        }
    }
}

/// Lower bound of the 95% Wilson score interval for `wins / total`
///
/// Returns 0.0 when `total == 0`. Small samples are pulled well below their
/// raw win rate, so a 3-0 composition does not outrank a 95-5 one.
pub fn wilson_lower_bound(wins: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }

    let n = total as f64;
    let phat = wins as f64 / n;
    let z2 = Z_95 * Z_95;

    let centre = phat + z2 / (2.0 * n);
    let margin = Z_95 * ((phat * (1.0 - phat) + z2 / (4.0 * n)) / n).sqrt();

    (centre - margin) / (1.0 + z2 / n)
}

/// `(wins + 1) / (total + 2)`
pub fn posterior_mean(wins: i64, total: i64) -> f64 {
    (wins as f64 + PRIOR_ALPHA) / (total as f64 + PRIOR_ALPHA + PRIOR_BETA)
}
