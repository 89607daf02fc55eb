use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::summary::SummaryNode;

/// Dimension name for the age bucket tag.
pub const AGE_DIMENSION: &str = "age_bucket";
/// Dimension name for cluster tags (non-exclusive).
pub const CLUSTER_DIMENSION: &str = "cluster";
/// Sentinel tag for a descriptor the normalizer could not read.
pub const UNKNOWN_TAG: &str = "unknown";
/// Bucket for ages the source explicitly withholds.
pub const UNPUBLISHED_TAG: &str = "unpublished";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One per-case row as supplied by the spreadsheet collaborator.
#[derive(Debug, Clone)]
pub struct RawCaseRecord {
    /// 1-based data row in the source file, for error messages.
    pub row: usize,
    pub id: String,
    pub date: NaiveDate,
    pub age: Option<String>,
    /// Cluster name -> flag set on this record.
    pub clusters: BTreeMap<String, bool>,
    pub excluded: bool,
    pub raw_fields: BTreeMap<String, String>,
}

/// One row of the daily-aggregate source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDailyRecord {
    pub date: NaiveDate,
    pub tested: Option<u64>,
    pub positive: u64,
}

/// A running-total reading as of `date`, one value per configured metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CumulativeSnapshot {
    pub date: NaiveDate,
    pub metric_values: Vec<i64>,
}

/// Everything the engine needs for one run, fully materialized.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub cases: Vec<RawCaseRecord>,
    pub daily: Vec<RawDailyRecord>,
    pub snapshots: Vec<CumulativeSnapshot>,
    pub today: NaiveDate,
    /// Overrides every per-source last-update stamp when set.
    pub as_of: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Facts + series
// ---------------------------------------------------------------------------

pub type Tags = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFact {
    pub date: NaiveDate,
    pub count: u64,
    pub tags: Tags,
}

impl CanonicalFact {
    pub fn new(date: NaiveDate, count: u64) -> Self {
        Self {
            date,
            count,
            tags: Tags::new(),
        }
    }

    pub fn with_tag(mut self, dimension: &str, value: impl Into<String>) -> Self {
        self.tags
            .entry(dimension.to_string())
            .or_default()
            .insert(value.into());
        self
    }

    pub fn tag_values<'a>(&'a self, dimension: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .get(dimension)
            .into_iter()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    pub fn has_tag(&self, dimension: &str, value: &str) -> bool {
        self.tags
            .get(dimension)
            .is_some_and(|values| values.contains(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySeriesPoint {
    pub date: NaiveDate,
    pub totals: BTreeMap<String, u64>,
    pub grand_total: u64,
}

impl DailySeriesPoint {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            totals: BTreeMap::new(),
            grand_total: 0,
        }
    }

    pub fn total_for(&self, tag: &str) -> u64 {
        self.totals.get(tag).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaPoint {
    pub date: NaiveDate,
    pub metric_deltas: Vec<i64>,
}

/// A normalized case kept alongside its fact for the per-case listing.
#[derive(Debug, Clone)]
pub struct CaseEntry {
    pub id: String,
    pub fact: CanonicalFact,
    pub raw_fields: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Cases,
    DailyAggregate,
    Cumulative,
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cases => write!(f, "cases"),
            Self::DailyAggregate => write!(f, "daily_aggregate"),
            Self::Cumulative => write!(f, "cumulative"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    CaseVsAggregate,
    CaseVsCumulative,
    NegativeDelta,
    SumMismatch,
    MalformedTag,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaseVsAggregate => write!(f, "case_vs_aggregate"),
            Self::CaseVsCumulative => write!(f, "case_vs_cumulative"),
            Self::NegativeDelta => write!(f, "negative_delta"),
            Self::SumMismatch => write!(f, "sum_mismatch"),
            Self::MalformedTag => write!(f, "malformed_tag"),
        }
    }
}

/// One detected inconsistency. `message` is the identity across runs unless a
/// structural identity is configured; `kind` and `date` are absent on findings
/// persisted by older runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub message: String,
    pub source: SourceTag,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FindingKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl Finding {
    pub fn new(kind: FindingKind, source: SourceTag, date: NaiveDate, message: String) -> Self {
        Self {
            message,
            source,
            fixed: false,
            kind: Some(kind),
            date: Some(date),
        }
    }
}

/// Full date plus the `MM/DD` short form every dated finding message starts with.
pub fn finding_prefix(date: NaiveDate) -> String {
    format!("{} ({})", date.format("%Y/%m/%d"), short_date(date))
}

/// The `MM/DD` label used by summary artifacts and the explained-by heuristic.
pub fn short_date(date: NaiveDate) -> String {
    date.format("%m/%d").to_string()
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sickbeds {
    pub hospitalized: i64,
    pub remaining_beds: u64,
}

/// Per-source `YYYY/MM/DD HH:MM` stamps carried by the derived artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUpdates {
    pub cases: String,
    pub daily: String,
    pub cumulative: String,
}

/// Everything one engine run derives. Immutable once returned.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub meta: RunMeta,
    /// Normalized cases in source order.
    pub cases: Vec<CaseEntry>,
    pub case_totals: Vec<DailySeriesPoint>,
    pub age_series: Vec<DailySeriesPoint>,
    pub cluster_series: Vec<DailySeriesPoint>,
    pub age_categories: Vec<String>,
    pub cluster_categories: Vec<String>,
    /// Daily-aggregate rows, sorted by date.
    pub daily: Vec<RawDailyRecord>,
    pub aggregate_totals: Vec<DailySeriesPoint>,
    pub metrics: Vec<String>,
    /// Cumulative snapshots, sorted by date.
    pub snapshots: Vec<CumulativeSnapshot>,
    pub deltas: Vec<DeltaPoint>,
    pub summary: SummaryNode,
    pub sickbeds: Sickbeds,
    pub last_updates: SourceUpdates,
    /// Fresh findings of this run, by date.
    pub findings: Vec<Finding>,
}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NewWarningsFound,
    SomeFixedSomeNew,
    SomeFixedStillRemaining,
    AllFixed,
    NoNewButRemaining,
    NoWarnings,
}

impl RunOutcome {
    /// User-facing notification text for this outcome.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NewWarningsFound => "New data warnings were found.",
            Self::SomeFixedSomeNew => "Some data warnings were fixed, and new ones were found.",
            Self::SomeFixedStillRemaining => {
                "Some data warnings were fixed, but others are still open."
            }
            Self::AllFixed => "All data warnings have been fixed.",
            Self::NoNewButRemaining => "No new data warnings, but some are still open.",
            Self::NoWarnings => "No data warnings.",
        }
    }

    pub fn should_notify(&self) -> bool {
        matches!(
            self,
            Self::NewWarningsFound
                | Self::SomeFixedSomeNew
                | Self::AllFixed
                | Self::SomeFixedStillRemaining
        )
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewWarningsFound => write!(f, "new_warnings_found"),
            Self::SomeFixedSomeNew => write!(f, "some_fixed_some_new"),
            Self::SomeFixedStillRemaining => write!(f, "some_fixed_still_remaining"),
            Self::AllFixed => write!(f, "all_fixed"),
            Self::NoNewButRemaining => write!(f, "no_new_but_remaining"),
            Self::NoWarnings => write!(f, "no_warnings"),
        }
    }
}
