use chrono::{Days, NaiveDate, NaiveDateTime};
use tracing::info;

use crate::config::PipelineConfig;
use crate::delta::{extract_deltas, CUMULATIVE_SOURCE};
use crate::error::ReconError;
use crate::model::{
    CanonicalFact, CaseEntry, CumulativeSnapshot, PipelineInput, PipelineResult, RawDailyRecord,
    RunMeta, Sickbeds, SourceUpdates, AGE_DIMENSION, CLUSTER_DIMENSION,
};
use crate::normalize::{normalize_daily, Normalizer};
use crate::publish::TIMESTAMP_FORMAT;
use crate::series::{build_daily_series, SeriesSpec};
use crate::summary::{remaining_capacity, SummaryTree};
use crate::validate::{check_increasing, validate, ValidationInput, DAILY_SOURCE};

/// Run the whole derivation per config. Pure: no clock, no IO.
pub fn run(config: &PipelineConfig, input: &PipelineInput) -> Result<PipelineResult, ReconError> {
    let today = input.today;
    let metrics = &config.sources.cumulative.metrics;

    // Normalize
    let normalizer = Normalizer::from_config(config);
    let mut cases: Vec<CaseEntry> = Vec::with_capacity(input.cases.len());
    for record in &input.cases {
        if let Some(fact) = normalizer.normalize_case(record) {
            cases.push(CaseEntry {
                id: record.id.clone(),
                fact,
                raw_fields: record.raw_fields.clone(),
            });
        }
    }
    let facts: Vec<CanonicalFact> = cases.iter().map(|c| c.fact.clone()).collect();

    // Per-case series
    let age_categories = normalizer.age_categories();
    let cluster_categories = normalizer.cluster_categories();
    let case_totals = build_daily_series(&facts, &SeriesSpec::totals(), today);
    let age_series = build_daily_series(
        &facts,
        &SeriesSpec::by(AGE_DIMENSION, &age_categories),
        today,
    );
    let cluster_series = build_daily_series(
        &facts,
        &SeriesSpec::by(CLUSTER_DIMENSION, &cluster_categories),
        today,
    );

    // Daily aggregate, ending at its own last date
    let mut daily: Vec<RawDailyRecord> = input.daily.clone();
    daily.sort_by_key(|d| d.date);
    check_increasing(DAILY_SOURCE, daily.iter().map(|d| d.date))?;
    let aggregate_facts: Vec<CanonicalFact> = daily.iter().map(normalize_daily).collect();
    let aggregate_totals = match daily.last() {
        Some(last) => build_daily_series(&aggregate_facts, &SeriesSpec::totals(), last.date),
        None => Vec::new(),
    };

    // Cumulative
    if input.snapshots.is_empty() {
        return Err(ReconError::EmptySource(CUMULATIVE_SOURCE.into()));
    }
    let mut snapshots: Vec<CumulativeSnapshot> = input.snapshots.clone();
    snapshots.sort_by_key(|s| s.date);
    let delta_report = extract_deltas(&snapshots, metrics)?;

    // Cross-source checks
    let mut findings = validate(&ValidationInput {
        case_facts: &facts,
        case_totals: &case_totals,
        aggregate_totals: &aggregate_totals,
        snapshots: &snapshots,
        deltas: &delta_report.points,
        metrics,
        confirmed_metric: &config.checks.confirmed_metric,
        sum_rules: &config.checks.sum,
    })?;
    findings.extend(delta_report.findings.iter().cloned());
    findings.sort_by_key(|f| f.date);

    // Latest snapshot drives the summary tree and sickbeds
    let latest = snapshots
        .last()
        .ok_or_else(|| ReconError::EmptySource(CUMULATIVE_SOURCE.into()))?;
    let tree = SummaryTree::from_nodes(&config.summary_nodes());
    let summary = tree
        .fill(latest.date, metrics, &latest.metric_values)?
        .ok_or_else(|| ReconError::ConfigValidation("summary tree has no nodes".into()))?;

    let in_use = config
        .metric_index(&config.capacity.in_use_metric)
        .and_then(|i| latest.metric_values.get(i).copied())
        .unwrap_or(0);
    let sickbeds = Sickbeds {
        hospitalized: in_use,
        remaining_beds: remaining_capacity(config.capacity.sickbeds, in_use),
    };

    let stamp = |last: Option<NaiveDate>| last_update_stamp(input.as_of, last, today);
    let last_updates = SourceUpdates {
        cases: stamp(facts.iter().map(|f| f.date).max()),
        daily: stamp(daily.last().map(|d| d.date)),
        cumulative: stamp(Some(latest.date)),
    };

    info!(
        config = %config.name,
        cases = cases.len(),
        excluded = input.cases.len() - cases.len(),
        days = case_totals.len(),
        snapshots = snapshots.len(),
        findings = findings.len(),
        "pipeline run complete"
    );

    Ok(PipelineResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            today,
        },
        cases,
        case_totals,
        age_series,
        cluster_series,
        age_categories,
        cluster_categories,
        daily,
        aggregate_totals,
        metrics: metrics.clone(),
        snapshots,
        deltas: delta_report.points,
        summary,
        sickbeds,
        last_updates,
        findings,
    })
}

/// The day after `last` at 00:00, or the explicit `as_of`. A source with no
/// rows is stamped with `today`.
fn last_update_stamp(
    as_of: Option<NaiveDateTime>,
    last: Option<NaiveDate>,
    today: NaiveDate,
) -> String {
    let at = as_of.unwrap_or_else(|| {
        let day = match last {
            Some(d) => d.checked_add_days(Days::new(1)).unwrap_or(d),
            None => today,
        };
        day.and_hms_opt(0, 0, 0).unwrap_or_default()
    });
    at.format(TIMESTAMP_FORMAT).to_string()
}
