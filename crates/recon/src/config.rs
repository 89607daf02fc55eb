use std::collections::HashSet;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::error::ReconError;
use crate::summary::SummaryNodeConfig;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub age: AgeConfig,
    #[serde(default)]
    pub clusters: ClusterConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    /// Pre-order list of summary tree nodes. Empty means the built-in tree.
    #[serde(default)]
    pub summary: Vec<SummaryNodeConfig>,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

fn default_utc_offset() -> i32 {
    9
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub cases: CaseSourceConfig,
    pub daily: DailySourceConfig,
    pub cumulative: CumulativeSourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseSourceConfig {
    pub file: String,
    /// Case ids dropped before normalization.
    #[serde(default)]
    pub exclude_ids: Vec<String>,
    pub columns: CaseColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseColumns {
    pub id: String,
    pub date: String,
    pub age: String,
    #[serde(default)]
    pub excluded: Option<String>,
    /// Boolean flag columns, one per cluster. The column name is the cluster name.
    #[serde(default)]
    pub clusters: Vec<String>,
    /// Cell values that count as a set flag (compared after trimming, case-insensitive).
    #[serde(default = "default_flag_values")]
    pub flag_values: Vec<String>,
}

fn default_flag_values() -> Vec<String> {
    vec!["〇".into(), "○".into(), "1".into(), "true".into(), "yes".into()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailySourceConfig {
    pub file: String,
    pub columns: DailyColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyColumns {
    pub date: String,
    #[serde(default)]
    pub tested: Option<String>,
    pub positive: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CumulativeSourceConfig {
    pub file: String,
    pub date_column: String,
    /// Tracked metrics, in snapshot order. Each is also a column name.
    pub metrics: Vec<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AgeConfig {
    #[serde(default = "default_age_minimum")]
    pub minimum: u32,
    #[serde(default = "default_age_maximum")]
    pub maximum: u32,
    #[serde(default = "default_age_step")]
    pub step: u32,
    #[serde(default = "default_undisclosed")]
    pub undisclosed: Vec<String>,
}

fn default_age_minimum() -> u32 {
    10
}

fn default_age_maximum() -> u32 {
    90
}

fn default_age_step() -> u32 {
    10
}

fn default_undisclosed() -> Vec<String> {
    vec!["非公表".into(), "undisclosed".into(), "unpublished".into()]
}

impl Default for AgeConfig {
    fn default() -> Self {
        Self {
            minimum: default_age_minimum(),
            maximum: default_age_maximum(),
            step: default_age_step(),
            undisclosed: default_undisclosed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Label for cases with no cluster flag set.
    #[serde(default = "default_unlinked")]
    pub unlinked: String,
}

fn default_unlinked() -> String {
    "unlinked".into()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            unlinked: default_unlinked(),
        }
    }
}

// ---------------------------------------------------------------------------
// Checks + capacity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChecksConfig {
    /// Cumulative metric whose daily delta must match the per-case count.
    #[serde(default = "default_confirmed_metric")]
    pub confirmed_metric: String,
    #[serde(default)]
    pub sum: Vec<SumRule>,
}

fn default_confirmed_metric() -> String {
    "confirmed".into()
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            confirmed_metric: default_confirmed_metric(),
            sum: Vec::new(),
        }
    }
}

/// `total` must equal the sum of `parts` on every snapshot date.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SumRule {
    pub total: String,
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapacityConfig {
    #[serde(default)]
    pub sickbeds: u64,
    #[serde(default = "default_in_use_metric")]
    pub in_use_metric: String,
}

fn default_in_use_metric() -> String {
    "hospitalized".into()
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            sickbeds: 0,
            in_use_metric: default_in_use_metric(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publish + notify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_schema_dir")]
    pub schema_dir: String,
    /// Base URLs of the published site, tried in order for previous state.
    #[serde(default)]
    pub previous_urls: Vec<String>,
    #[serde(default)]
    pub identity: IdentityMode,
}

fn default_output_dir() -> String {
    "data".into()
}

fn default_schema_dir() -> String {
    "schema".into()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            schema_dir: default_schema_dir(),
            previous_urls: Vec::new(),
            identity: IdentityMode::default(),
        }
    }
}

/// How findings are matched across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    #[default]
    Message,
    Structural,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.offset().is_none() {
            return Err(ReconError::ConfigValidation(format!(
                "utc_offset_hours must be between -12 and 14, got {}",
                self.utc_offset_hours
            )));
        }

        let metrics = &self.sources.cumulative.metrics;
        if metrics.is_empty() {
            return Err(ReconError::ConfigValidation(
                "sources.cumulative.metrics must list at least one metric".into(),
            ));
        }
        let mut seen = HashSet::new();
        for m in metrics {
            if m.trim().is_empty() {
                return Err(ReconError::ConfigValidation("empty metric name".into()));
            }
            if !seen.insert(m.as_str()) {
                return Err(ReconError::ConfigValidation(format!("duplicate metric '{m}'")));
            }
        }

        let known = |name: &str, what: &str| -> Result<(), ReconError> {
            if seen.contains(name) {
                Ok(())
            } else {
                Err(ReconError::ConfigValidation(format!(
                    "{what} refers to unknown metric '{name}'"
                )))
            }
        };
        known(&self.checks.confirmed_metric, "checks.confirmed_metric")?;
        known(&self.capacity.in_use_metric, "capacity.in_use_metric")?;
        for rule in &self.checks.sum {
            if rule.parts.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "sum rule for '{}' has no parts",
                    rule.total
                )));
            }
            known(&rule.total, "checks.sum")?;
            for part in &rule.parts {
                known(part, "checks.sum")?;
            }
        }

        let tree = self.summary_nodes();
        let mut placed: HashSet<&str> = HashSet::new();
        for (i, node) in tree.iter().enumerate() {
            known(&node.metric, "summary")?;
            match (&node.parent, i) {
                (None, 0) => {}
                (None, _) => {
                    return Err(ReconError::ConfigValidation(format!(
                        "summary node '{}' has no parent; only the first node is the root",
                        node.metric
                    )))
                }
                (Some(parent), _) if !placed.contains(parent.as_str()) => {
                    return Err(ReconError::ConfigValidation(format!(
                        "summary node '{}' refers to parent '{parent}' before it is declared",
                        node.metric
                    )))
                }
                _ => {}
            }
            if !placed.insert(node.metric.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "summary node '{}' declared twice",
                    node.metric
                )));
            }
        }

        let age = &self.age;
        if age.step == 0 || age.minimum == 0 || age.minimum >= age.maximum {
            return Err(ReconError::ConfigValidation(format!(
                "age bounds must satisfy 0 < minimum < maximum and step > 0 (got {}..{} step {})",
                age.minimum, age.maximum, age.step
            )));
        }
        if (age.maximum - age.minimum) % age.step != 0 {
            return Err(ReconError::ConfigValidation(format!(
                "age range {}..{} is not a multiple of step {}",
                age.minimum, age.maximum, age.step
            )));
        }

        let cols = &self.sources.cases.columns;
        if cols.clusters.iter().any(|c| c == &self.clusters.unlinked) {
            return Err(ReconError::ConfigValidation(format!(
                "cluster column '{}' collides with the unlinked label",
                self.clusters.unlinked
            )));
        }

        Ok(())
    }

    /// Fixed offset used for "today" and the shared last-update stamp.
    pub fn offset(&self) -> Option<FixedOffset> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return None;
        }
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
    }

    /// Configured summary tree, or the built-in one.
    pub fn summary_nodes(&self) -> Vec<SummaryNodeConfig> {
        if self.summary.is_empty() {
            crate::summary::default_tree()
        } else {
            self.summary.clone()
        }
    }

    pub fn metric_index(&self, name: &str) -> Option<usize> {
        self.sources.cumulative.metrics.iter().position(|m| m == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
