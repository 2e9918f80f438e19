//! Review queue for user-submitted results
//!
//! A submission only touches the aggregates when it is approved (or entered
//! manually by a moderator). Every status change and its aggregate mutation
//! commit in the same transaction, so a submission's contribution is counted
//! exactly when its status says so.
//!
//! ```text
//!            approve               reject
//! pending ───────────▶ approved ───────────▶ rejected
//!    ▲  └──────────────── reject ─────────────▶ │
//!    └──────────── revert (approved|rejected) ──┘
//! ```

use crate::aggregate_core::{DetailDelta, LoadoutEntry, SummaryDelta};
use crate::error::{StoreError, StoreResult};
use crate::store::db::{apply_detail_batch, apply_summary_batch};
use crate::store::rows::json_column;
use crate::store::SqliteAggregateStore;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            other => Err(StoreError::Submission(format!("unknown status '{}'", other))),
        }
    }
}

/// Moderator decision on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
    Revert,
}

/// A result as reported, before review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub scope: String,
    pub season: i32,
    #[serde(default)]
    pub tag: String,
    pub attacker: Vec<i64>,
    pub defender: Vec<i64>,
    #[serde(default)]
    pub attacker_loadout: Vec<LoadoutEntry>,
    #[serde(default)]
    pub defender_loadout: Vec<LoadoutEntry>,
    pub wins: i64,
    pub losses: i64,
    #[serde(default)]
    pub note: String,
}

impl NewSubmission {
    pub fn validate(&self) -> StoreResult<()> {
        if self.season < 1 {
            return Err(invalid(format!("season must be >= 1, got {}", self.season)));
        }
        if self.wins < 0 || self.losses < 0 {
            return Err(invalid(format!(
                "wins and losses cannot be negative ({}/{})",
                self.wins, self.losses
            )));
        }
        if self.wins == 0 && self.losses == 0 {
            return Err(invalid("wins and losses cannot both be zero".to_string()));
        }
        self.detail_delta(1, 0).validate()
    }

    fn scope_normalized(&self) -> String {
        self.scope.trim().to_lowercase()
    }

    /// Contribution of this submission, scaled by `sign` (+1 or -1)
    fn summary_delta(&self, sign: i64, timestamp: i64) -> SummaryDelta {
        SummaryDelta {
            scope: self.scope_normalized(),
            season: self.season,
            tag: self.tag.clone(),
            attacker: self.attacker.clone(),
            defender: self.defender.clone(),
            wins_delta: sign * self.wins,
            losses_delta: sign * self.losses,
            timestamp,
        }
    }

    fn detail_delta(&self, sign: i64, timestamp: i64) -> DetailDelta {
        DetailDelta {
            base: self.summary_delta(sign, timestamp),
            attacker_loadout: self.attacker_loadout.clone(),
            defender_loadout: self.defender_loadout.clone(),
        }
    }
}

fn invalid(msg: String) -> StoreError {
    StoreError::InvalidDelta(msg)
}

/// A stored submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    #[serde(flatten)]
    pub entry: NewSubmission,
    pub status: SubmissionStatus,
    pub created_at: i64,
}

const SUBMISSION_COLUMNS: &str = "id, scope, season, tag, attacker_roster, defender_roster, \
     attacker_loadout, defender_loadout, wins, losses, note, status, created_at";

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let status: String = row.get(11)?;
    let status = status.parse::<SubmissionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Submission {
        id: row.get(0)?,
        entry: NewSubmission {
            scope: row.get(1)?,
            season: row.get(2)?,
            tag: row.get(3)?,
            attacker: json_column(row, 4)?,
            defender: json_column(row, 5)?,
            attacker_loadout: json_column(row, 6)?,
            defender_loadout: json_column(row, 7)?,
            wins: row.get(8)?,
            losses: row.get(9)?,
            note: row.get(10)?,
        },
        status,
        created_at: row.get(12)?,
    })
}

fn insert_submission(
    conn: &Connection,
    entry: &NewSubmission,
    status: SubmissionStatus,
    created_at: i64,
) -> StoreResult<i64> {
    conn.execute(
        r#"
        INSERT INTO arena_submissions (
            scope, season, tag, attacker_roster, defender_roster,
            attacker_loadout, defender_loadout, wins, losses, note, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            entry.scope_normalized(),
            entry.season,
            entry.tag,
            serde_json::to_string(&entry.attacker)?,
            serde_json::to_string(&entry.defender)?,
            serde_json::to_string(&entry.attacker_loadout)?,
            serde_json::to_string(&entry.defender_loadout)?,
            entry.wins,
            entry.losses,
            entry.note,
            status.as_str(),
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn load_submission(conn: &Connection, id: i64) -> StoreResult<Option<Submission>> {
    let sql = format!("SELECT {} FROM arena_submissions WHERE id = ?1", SUBMISSION_COLUMNS);
    Ok(conn.query_row(&sql, params![id], submission_from_row).optional()?)
}

fn set_status(conn: &Connection, id: i64, status: SubmissionStatus) -> StoreResult<()> {
    conn.execute(
        "UPDATE arena_submissions SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(())
}

/// Add (`sign = 1`) or withdraw (`sign = -1`) a submission's contribution
fn apply_contribution(conn: &Connection, entry: &NewSubmission, sign: i64, timestamp: i64) -> StoreResult<()> {
    apply_summary_batch(conn, &[entry.summary_delta(sign, timestamp)])?;
    apply_detail_batch(conn, &[entry.detail_delta(sign, timestamp)])?;
    Ok(())
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SqliteAggregateStore {
    /// Queue a result for review; returns the new submission id
    pub async fn create_submission(&self, entry: &NewSubmission) -> StoreResult<i64> {
        entry.validate()?;
        let id = self.with_write_tx(|tx| {
            insert_submission(tx, entry, SubmissionStatus::Pending, now_ts())
        })?;
        log::info!("📝 Submission {} queued ({} vs {:?})", id, entry.scope, entry.attacker);
        Ok(id)
    }

    /// Record a moderator-entered result, counted immediately
    pub async fn record_manual_entry(&self, entry: &NewSubmission) -> StoreResult<i64> {
        entry.validate()?;
        let now = now_ts();
        let id = self.with_write_tx(|tx| {
            let id = insert_submission(tx, entry, SubmissionStatus::Approved, now)?;
            apply_contribution(tx, entry, 1, now)?;
            Ok(id)
        })?;
        log::info!("✅ Manual entry {} recorded", id);
        Ok(id)
    }

    /// Move a submission through review, adjusting the aggregates to match
    ///
    /// Returns the submission's new status.
    pub async fn process_submission(&self, id: i64, action: ReviewAction) -> StoreResult<SubmissionStatus> {
        let now = now_ts();
        let status = self.with_write_tx(|tx| {
            let submission = load_submission(tx, id)?
                .ok_or_else(|| StoreError::Submission(format!("submission {} not found", id)))?;
            let entry = &submission.entry;

            let next = match (submission.status, action) {
                (SubmissionStatus::Pending, ReviewAction::Approve) => {
                    apply_contribution(tx, entry, 1, now)?;
                    SubmissionStatus::Approved
                }
                (SubmissionStatus::Pending, ReviewAction::Reject) => SubmissionStatus::Rejected,
                (SubmissionStatus::Approved, ReviewAction::Reject) => {
                    apply_contribution(tx, entry, -1, now)?;
                    SubmissionStatus::Rejected
                }
                (SubmissionStatus::Approved, ReviewAction::Revert) => {
                    apply_contribution(tx, entry, -1, now)?;
                    SubmissionStatus::Pending
                }
                (SubmissionStatus::Rejected, ReviewAction::Revert) => SubmissionStatus::Pending,
                (current, action) => {
                    return Err(StoreError::Submission(format!(
                        "cannot {:?} submission {} in status {}",
                        action, id, current
                    )));
                }
            };

            set_status(tx, id, next)?;
            Ok(next)
        })?;

        log::info!("🔁 Submission {} → {} ({:?})", id, status, action);
        Ok(status)
    }

    pub async fn get_submission(&self, id: i64) -> StoreResult<Option<Submission>> {
        self.with_conn(|conn| load_submission(conn, id))
    }

    /// Submissions awaiting review, oldest first
    pub async fn pending_submissions(&self) -> StoreResult<Vec<Submission>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM arena_submissions WHERE status = 'pending' \
                 ORDER BY created_at ASC, id ASC",
                SUBMISSION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], submission_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Reviewed submissions, newest first
    pub async fn submission_history(&self, limit: u32) -> StoreResult<Vec<Submission>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM arena_submissions WHERE status != 'pending' \
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
                SUBMISSION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit], submission_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
