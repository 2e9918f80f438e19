//! Aggregate Core - canonicalization and scoring
//!
//! Pure building blocks shared by the store and the importers.
//!
//! # Flow
//!
//! ```text
//! raw rosters ──► roster::canonicalize ──► SummaryKey
//!                      │
//! sparse loadouts ─► loadout::normalize ─► loadout::fingerprint ──► DetailKey
//!
//! (wins_delta, losses_delta, ts) ──► Tally::apply ──► Scores
//! ```

pub mod loadout;
pub mod roster;
pub mod scorer;
pub mod tally;
pub mod types;

pub use loadout::LoadoutEntry;
pub use roster::{canonicalize, CanonicalRoster};
pub use scorer::{posterior_mean, wilson_lower_bound, Scores};
pub use tally::{Tally, TallyOutcome};
pub use types::{
    DetailDelta, DetailKey, DetailRow, ResolvedDetail, ResolvedSummary, SummaryDelta, SummaryKey,
    SummaryRow,
};
