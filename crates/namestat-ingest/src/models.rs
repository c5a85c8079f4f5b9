//! Domain models for the name statistics store
//!
//! These types map one-to-one onto the tables in `migrations/` and are shared
//! by the parser, the importers and the ranking engine.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::IngestError;

/// Maximum length of a recorded name spelling
pub const MAX_NAME_LEN: usize = 15;

/// Recorded sex of a name, as published (`M` / `F`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "M" => Ok(Sex::Male),
            "F" => Ok(Sex::Female),
            other => Err(IngestError::Validation(format!("Unknown sex code '{}'", other))),
        }
    }
}

/// Which published archive an import run consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    National,
    State,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::National => "national",
            DatasetKind::State => "state",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "national" => Ok(DatasetKind::National),
            "state" => Ok(DatasetKind::State),
            other => Err(IngestError::Validation(format!("Unknown dataset kind '{}'", other))),
        }
    }
}

/// Import run status (maps to `import_runs.status`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

impl FromStr for RunStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RunStatus::InProgress),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(IngestError::Validation(format!("Unknown run status '{}'", other))),
        }
    }
}

/// Inclusive year window; an absent bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl YearRange {
    pub fn new(min: Option<i32>, max: Option<i32>) -> Self {
        Self { min, max }
    }

    pub fn between(min: i32, max: i32) -> Self {
        Self::new(Some(min), Some(max))
    }

    /// Unbounded on both sides
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.min.map_or(true, |min| year >= min) && self.max.map_or(true, |max| year <= max)
    }

    /// True when every year in `other` is also in `self`.
    pub fn covers(&self, other: &YearRange) -> bool {
        let lower = match (self.min, other.min) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine <= theirs,
        };
        let upper = match (self.max, other.max) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine >= theirs,
        };
        lower && upper
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }

    /// Split `[from, to]` into consecutive windows of at most `width` years.
    ///
    /// A zero width is treated as one year per chunk. An inverted range yields
    /// no chunks.
    pub fn chunks(from: i32, to: i32, width: u32) -> Vec<YearRange> {
        let width = i64::from(width.max(1));
        let mut chunks = Vec::new();
        let mut start = i64::from(from);
        let end = i64::from(to);

        while start <= end {
            let stop = (start + width - 1).min(end);
            // Both values lie within [from, to], so they fit back into i32.
            chunks.push(YearRange::between(start as i32, stop as i32));
            start = stop + 1;
        }

        chunks
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (None, None) => f.write_str("all years"),
            (Some(min), None) => write!(f, "{}..", min),
            (None, Some(max)) => write!(f, "..={}", max),
            (Some(min), Some(max)) => write!(f, "{}..={}", min, max),
        }
    }
}

/// A unique (spelling, sex) pair (maps to `names`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub id: Uuid,
    pub name: String,
    pub sex: Sex,
    pub created_at: DateTime<Utc>,
}

impl Name {
    pub fn new(name: impl Into<String>, sex: Sex) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sex,
            created_at: Utc::now(),
        }
    }
}

/// Count of one name in one year (maps to `name_yearly_stats`)
///
/// `rank`, `proportion` and `rank_change` are only written by the ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyStat {
    pub id: Uuid,
    pub name_id: Uuid,
    pub year: i32,
    pub count: i32,
    pub rank: Option<i32>,
    pub proportion: Option<BigDecimal>,
    pub rank_change: Option<i32>,
}

impl YearlyStat {
    pub fn new(name_id: Uuid, year: i32, count: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name_id,
            year,
            count,
            rank: None,
            proportion: None,
            rank_change: None,
        }
    }
}

/// Per-state count for a yearly stat (maps to `name_state_breakdowns`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBreakdown {
    pub id: Uuid,
    pub yearly_stat_id: Uuid,
    pub state_code: String,
    pub count: i32,
    pub rank: Option<i32>,
}

impl StateBreakdown {
    pub fn new(yearly_stat_id: Uuid, state_code: impl Into<String>, count: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            yearly_stat_id,
            state_code: state_code.into(),
            count,
            rank: None,
        }
    }
}

/// One archive import invocation (maps to `import_runs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: Uuid,
    pub dataset_kind: DatasetKind,
    pub source: String,
    pub checksum: Option<String>,
    /// Requested window, lower bound
    pub min_year: Option<i32>,
    /// Requested window, upper bound
    pub max_year: Option<i32>,
    /// Highest year actually observed in the archive
    pub data_year: Option<i32>,
    pub record_count: i64,
    pub name_count: i64,
    pub status: RunStatus,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    /// A fresh in-progress run for `source` over `window`
    pub fn started(kind: DatasetKind, source: impl Into<String>, window: YearRange) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_kind: kind,
            source: source.into(),
            checksum: None,
            min_year: window.min,
            max_year: window.max,
            data_year: None,
            record_count: 0,
            name_count: 0,
            status: RunStatus::InProgress,
            message: None,
            duration_ms: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn window(&self) -> YearRange {
        YearRange::new(self.min_year, self.max_year)
    }

    /// Close the run with a terminal status.
    pub fn finish(&mut self, status: RunStatus, message: impl Into<String>) {
        let finished_at = Utc::now();
        self.status = status;
        self.message = Some(message.into());
        self.duration_ms = Some((finished_at - self.started_at).num_milliseconds());
        self.finished_at = Some(finished_at);
    }
}

/// Key of an already persisted yearly stat, used to seed the dedup cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatKey {
    pub stat_id: Uuid,
    pub name_id: Uuid,
    pub year: i32,
}

/// Key of an already persisted state breakdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownKey {
    pub yearly_stat_id: Uuid,
    pub state_code: String,
}

/// A yearly stat joined with its name, as seen by the ranking pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortStat {
    pub stat_id: Uuid,
    pub name_id: Uuid,
    pub name: String,
    pub count: i32,
    pub rank: Option<i32>,
}

/// A state breakdown joined with its name, as seen by the state ranking pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCohortEntry {
    pub breakdown_id: Uuid,
    pub name: String,
    pub count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatRanking {
    pub stat_id: Uuid,
    pub rank: i32,
    pub proportion: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankChange {
    pub stat_id: Uuid,
    pub rank_change: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakdownRank {
    pub breakdown_id: Uuid,
    pub rank: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_codes() {
        assert_eq!("M".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!(" F ".parse::<Sex>().unwrap(), Sex::Female);
        assert!("X".parse::<Sex>().is_err());
        assert!("m".parse::<Sex>().is_err());
        assert_eq!(Sex::Female.to_string(), "F");
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [RunStatus::InProgress, RunStatus::Success, RunStatus::Failed] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_year_range_contains() {
        let range = YearRange::between(2000, 2010);
        assert!(range.contains(2000));
        assert!(range.contains(2010));
        assert!(!range.contains(1999));
        assert!(!range.contains(2011));
        assert!(YearRange::all().contains(1880));
        assert!(YearRange::new(Some(2000), None).contains(3000));
    }

    #[test]
    fn test_year_range_covers() {
        let wide = YearRange::between(1880, 2023);
        let narrow = YearRange::between(1990, 2000);
        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
        assert!(YearRange::all().covers(&wide));
        assert!(!wide.covers(&YearRange::all()));
        assert!(wide.covers(&wide));
    }

    #[test]
    fn test_year_range_chunks() {
        let chunks = YearRange::chunks(1880, 1905, 10);
        assert_eq!(
            chunks,
            vec![
                YearRange::between(1880, 1889),
                YearRange::between(1890, 1899),
                YearRange::between(1900, 1905),
            ]
        );
        assert_eq!(YearRange::chunks(2000, 2002, 0).len(), 3);
        assert!(YearRange::chunks(2010, 2000, 5).is_empty());
    }

    #[test]
    fn test_import_run_finish_sets_duration() {
        let mut run = ImportRun::started(DatasetKind::National, "names.zip", YearRange::all());
        assert_eq!(run.status, RunStatus::InProgress);
        run.finish(RunStatus::Success, "Success");
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.finished_at.is_some());
        assert!(run.duration_ms.unwrap() >= 0);
    }
}
