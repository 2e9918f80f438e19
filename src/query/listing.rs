//! Paginated, filtered listing over the aggregate tables
//!
//! Predicates are composed into one `WHERE` clause shared by the count query
//! and the page query, so `total_count` always describes the same row set the
//! page was cut from.

use crate::aggregate_core::{DetailRow, SummaryRow};
use crate::error::StoreResult;
use crate::store::rows::{detail_from_row, summary_from_row, DETAIL_COLUMNS, SUMMARY_COLUMNS};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SUMMARY_TABLE: &str = "arena_summaries";
const DETAIL_TABLE: &str = "arena_details";

const SUMMARY_TIEBREAK: &str = "scope, season, tag, attacker_signature, defender_signature";
const DETAIL_TIEBREAK: &str =
    "scope, season, tag, attacker_signature, defender_signature, loadout_fingerprint";

/// Filters shared by summary and detail listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    /// `None` lists every scope
    pub scope: Option<String>,
    pub season: Option<i32>,
    pub tag: Option<String>,
    /// Every listed unit must appear somewhere on the attacking roster
    pub attacker_contains: Vec<i64>,
    pub defender_contains: Vec<i64>,
    /// Slot index (0-based, canonical order) → required unit id
    pub attacker_slots: BTreeMap<usize, i64>,
    pub defender_slots: BTreeMap<usize, i64>,
    pub min_battles: Option<i64>,
    /// Raw wins / battles, not the smoothed estimate
    pub min_win_rate: Option<f64>,
}

impl ListFilter {
    /// Map a request's scope parameter; `"all"` disables scope filtering
    pub fn scope_from_param(param: &str) -> Option<String> {
        if param.eq_ignore_ascii_case("all") {
            None
        } else {
            Some(param.to_string())
        }
    }
}

/// Detail listing is always scoped to one composition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailListFilter {
    pub attacker_signature: String,
    pub defender_signature: String,
    #[serde(flatten)]
    pub filter: ListFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    BattleCount,
    LastSeen,
    MeanEstimate,
    ConfidenceScore,
}

impl SortKey {
    fn column(self) -> &'static str {
        match self {
            SortKey::BattleCount => "total_battles",
            SortKey::LastSeen => "last_seen",
            SortKey::MeanEstimate => "mean_estimate",
            SortKey::ConfidenceScore => "confidence_score",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Desc => "DESC",
            SortDirection::Asc => "ASC",
        }
    }
}

/// Ordering of a listing; defaults to most battles first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Parse a sort parameter leniently
    ///
    /// Accepts the key names (`battle_count`, `last_seen`, `mean_estimate`,
    /// `confidence_score`) and the legacy names (`default`, `newest`,
    /// `win_rate`, `composite`). Any `asc` in the parameter selects ascending
    /// order; `asc`/`desc` words are dropped before the key is matched, so
    /// `newest_asc` and `asc_newest` agree. Anything unrecognised sorts by
    /// battle count.
    pub fn parse(param: &str) -> Self {
        let lower = param.trim().to_ascii_lowercase();

        let direction = if lower.contains("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };

        let name = lower
            .split(|c: char| c == '_' || c == ' ' || c == ':')
            .filter(|word| !word.is_empty() && *word != "asc" && *word != "desc")
            .collect::<Vec<_>>()
            .join("_");

        let key = match name.as_str() {
            "newest" | "last_seen" => SortKey::LastSeen,
            "composite" | "confidence_score" => SortKey::ConfidenceScore,
            n if n.contains("win_rate") || n == "mean_estimate" => SortKey::MeanEstimate,
            _ => SortKey::BattleCount,
        };

        Self { key, direction }
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Page 0 is treated as page 1
    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.limit)
    }
}

/// One page of results plus the size of the full filtered set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.limit == 0 {
            return 0;
        }
        let limit = i64::from(self.limit);
        (self.total_count + limit - 1) / limit
    }
}

/// `AND`-joined SQL predicates with their bound values, in placeholder order
#[derive(Debug, Default)]
struct Predicates {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Predicates {
    fn push(&mut self, clause: impl Into<String>, value: impl Into<Value>) {
        self.clauses.push(clause.into());
        self.values.push(value.into());
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn add_filter(&mut self, table: &str, filter: &ListFilter) {
        if let Some(scope) = &filter.scope {
            self.push("scope = ?", scope.clone());
        }
        if let Some(season) = filter.season {
            self.push("season = ?", season);
        }
        if let Some(tag) = &filter.tag {
            self.push("tag = ?", tag.clone());
        }

        for (column, units) in [
            ("attacker_roster", &filter.attacker_contains),
            ("defender_roster", &filter.defender_contains),
        ] {
            for unit in units {
                self.push(
                    format!(
                        "EXISTS (SELECT 1 FROM json_each({}.{}) WHERE json_each.value = ?)",
                        table, column
                    ),
                    *unit,
                );
            }
        }

        for (column, slots) in [
            ("attacker_roster", &filter.attacker_slots),
            ("defender_roster", &filter.defender_slots),
        ] {
            for (slot, unit) in slots {
                self.push(format!("json_extract({}, '$[{}]') = ?", column, slot), *unit);
            }
        }

        if let Some(min_battles) = filter.min_battles {
            self.push("total_battles >= ?", min_battles);
        }
        if let Some(min_win_rate) = filter.min_win_rate {
            self.push(
                "CAST(total_wins AS REAL) / NULLIF(total_battles, 0) >= ?",
                min_win_rate,
            );
        }
    }
}

struct Listing<'a> {
    table: &'a str,
    columns: &'a str,
    tiebreak: &'a str,
}

impl Listing<'_> {
    fn run<T>(
        &self,
        conn: &Connection,
        predicates: Predicates,
        page: PageRequest,
        sort: Sort,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> StoreResult<Page<T>> {
        let where_sql = predicates.where_sql();

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{}", self.table, where_sql),
            params_from_iter(predicates.values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} {}, {} LIMIT ? OFFSET ?",
            self.columns,
            self.table,
            where_sql,
            sort.key.column(),
            sort.direction.sql(),
            self.tiebreak
        );

        let mut values = predicates.values;
        values.push(Value::from(i64::from(page.limit)));
        values.push(Value::from(page.offset()));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), map)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            rows,
            total_count,
            page: page.page.max(1),
            limit: page.limit,
        })
    }
}

/// List summary aggregates
pub fn list_summaries(
    conn: &Connection,
    filter: &ListFilter,
    page: PageRequest,
    sort: Sort,
) -> StoreResult<Page<SummaryRow>> {
    let mut predicates = Predicates::default();
    predicates.add_filter(SUMMARY_TABLE, filter);

    Listing {
        table: SUMMARY_TABLE,
        columns: SUMMARY_COLUMNS,
        tiebreak: SUMMARY_TIEBREAK,
    }
    .run(conn, predicates, page, sort, summary_from_row)
}

/// List detail aggregates of one attacker/defender composition
pub fn list_details(
    conn: &Connection,
    filter: &DetailListFilter,
    page: PageRequest,
    sort: Sort,
) -> StoreResult<Page<DetailRow>> {
    let mut predicates = Predicates::default();
    predicates.push("attacker_signature = ?", filter.attacker_signature.clone());
    predicates.push("defender_signature = ?", filter.defender_signature.clone());
    predicates.add_filter(DETAIL_TABLE, &filter.filter);

    Listing {
        table: DETAIL_TABLE,
        columns: DETAIL_COLUMNS,
        tiebreak: DETAIL_TIEBREAK,
    }
    .run(conn, predicates, page, sort, detail_from_row)
}

/// Seasons that have at least one summary, newest first
///
/// `None`, an empty scope and `"all"` list every scope. An empty store still
/// reports season 1 so callers always have something to select.
pub fn list_seasons(conn: &Connection, scope: Option<&str>) -> StoreResult<Vec<i32>> {
    let mut predicates = Predicates::default();
    if let Some(scope) = scope
        .filter(|s| !s.is_empty())
        .and_then(ListFilter::scope_from_param)
    {
        predicates.push("scope = ?", scope);
    }

    let sql = format!(
        "SELECT DISTINCT season FROM {}{} ORDER BY season DESC",
        SUMMARY_TABLE,
        predicates.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut seasons = stmt
        .query_map(params_from_iter(predicates.values.iter()), |row| row.get(0))?
        .collect::<Result<Vec<i32>, _>>()?;

    if seasons.is_empty() {
        seasons.push(1);
    }
    Ok(seasons)
}
