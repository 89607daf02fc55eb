//! Cross-source consistency checks.
//!
//! Every date is checked against up to three views of the same count: the
//! per-case total, the daily aggregate, and the cumulative delta (summed over
//! the cases since the previous snapshot). Dates before the first case are
//! not compared. A disagreement becomes a [`Finding`] carrying the signed
//! difference; nothing here fails on content. Only ordering problems are
//! errors.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included};

use chrono::NaiveDate;
use tracing::debug;

use crate::config::SumRule;
use crate::error::ReconError;
use crate::model::{
    finding_prefix, short_date, CanonicalFact, CumulativeSnapshot, DailySeriesPoint, DeltaPoint,
    Finding, FindingKind, SourceTag, UNKNOWN_TAG,
};

pub const CASES_SOURCE: &str = "cases";
pub const DAILY_SOURCE: &str = "daily";

#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub case_facts: &'a [CanonicalFact],
    /// Contiguous per-case totals.
    pub case_totals: &'a [DailySeriesPoint],
    /// Contiguous daily-aggregate positives, ending at the aggregate's last date.
    pub aggregate_totals: &'a [DailySeriesPoint],
    pub snapshots: &'a [CumulativeSnapshot],
    pub deltas: &'a [DeltaPoint],
    pub metrics: &'a [String],
    pub confirmed_metric: &'a str,
    pub sum_rules: &'a [SumRule],
}

/// Run every cross-source check, in date order.
pub fn validate(input: &ValidationInput<'_>) -> Result<Vec<Finding>, ReconError> {
    check_increasing(CASES_SOURCE, input.case_totals.iter().map(|p| p.date))?;
    check_increasing(DAILY_SOURCE, input.aggregate_totals.iter().map(|p| p.date))?;
    check_increasing(
        crate::delta::CUMULATIVE_SOURCE,
        input.deltas.iter().map(|p| p.date),
    )?;

    let confirmed = metric_position(input.metrics, input.confirmed_metric)?;
    let rules = resolve_rules(input.metrics, input.sum_rules)?;

    let case_totals: BTreeMap<NaiveDate, u64> =
        input.case_totals.iter().map(|p| (p.date, p.grand_total)).collect();
    let aggregate: BTreeMap<NaiveDate, u64> = input
        .aggregate_totals
        .iter()
        .map(|p| (p.date, p.grand_total))
        .collect();
    let aggregate_last = input.aggregate_totals.last().map(|p| p.date);
    let case_first = input.case_totals.first().map(|p| p.date);
    let snapshots: BTreeMap<NaiveDate, &CumulativeSnapshot> =
        input.snapshots.iter().map(|s| (s.date, s)).collect();
    let deltas = delta_spans(input.deltas, &snapshots, confirmed);
    let first_delta = input.deltas.first().map(|p| p.date);
    let unknown = unknown_tag_counts(input.case_facts);

    let dates: BTreeSet<NaiveDate> = case_totals
        .keys()
        .chain(aggregate.keys())
        .chain(deltas.keys())
        .chain(snapshots.keys())
        .copied()
        .collect();

    let mut findings: Vec<Finding> = Vec::new();

    for date in dates {
        let prefix = finding_prefix(date);

        if let Some((count, dimensions)) = unknown.get(&date) {
            let dims: Vec<&str> = dimensions.iter().map(String::as_str).collect();
            findings.push(Finding::new(
                FindingKind::MalformedTag,
                SourceTag::Cases,
                date,
                format!(
                    "{prefix}: {count} case record(s) with unreadable {}",
                    dims.join(", ")
                ),
            ));
        }

        let case_total = case_totals.get(&date).copied().unwrap_or(0) as i64;
        // Before the first case there is no per-case figure to compare.
        let cases_known = case_first.is_some_and(|first| date >= first);

        // Past the aggregate's last date there is nothing to compare against.
        if cases_known && aggregate_last.is_some_and(|last| date <= last) {
            if let Some(&agg) = aggregate.get(&date) {
                let agg = agg as i64;
                if case_total != agg {
                    findings.push(Finding::new(
                        FindingKind::CaseVsAggregate,
                        SourceTag::Cases,
                        date,
                        format!(
                            "{prefix}: per-case total {case_total} does not match daily aggregate positive {agg} (difference {:+})",
                            case_total - agg
                        ),
                    ));
                }
            }
        }

        if cases_known && first_delta.is_some_and(|first| date >= first) {
            if let Some(&(since, delta)) = deltas.get(&date) {
                let case_sum: i64 = case_totals
                    .range((Excluded(since), Included(date)))
                    .map(|(_, n)| *n as i64)
                    .sum();
                if case_sum != delta {
                    let span = if since.succ_opt() == Some(date) {
                        String::new()
                    } else {
                        format!(" since {}", short_date(since))
                    };
                    let short = short_date(date);
                    let explained = findings
                        .iter()
                        .any(|f| f.source == SourceTag::Cases && f.message.contains(&short));
                    let source = if explained {
                        SourceTag::Cases
                    } else {
                        SourceTag::Cumulative
                    };
                    findings.push(Finding::new(
                        FindingKind::CaseVsCumulative,
                        source,
                        date,
                        format!(
                            "{prefix}: per-case total {case_sum}{span} does not match cumulative {} delta {delta} (difference {:+})",
                            input.confirmed_metric,
                            case_sum - delta
                        ),
                    ));
                }
            }
        }

        if let Some(snapshot) = snapshots.get(&date) {
            for rule in &rules {
                if let Some(f) = rule.check(snapshot, &prefix) {
                    findings.push(f);
                }
            }
        }
    }

    debug!(findings = findings.len(), "cross-source validation finished");
    Ok(findings)
}

pub(crate) fn check_increasing(
    source: &str,
    dates: impl Iterator<Item = NaiveDate>,
) -> Result<(), ReconError> {
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        if let Some(prev) = previous {
            if date == prev {
                return Err(ReconError::DuplicateDate {
                    source: source.into(),
                    date,
                });
            }
            if date < prev {
                return Err(ReconError::NonMonotonicDate {
                    source: source.into(),
                    previous: prev,
                    next: date,
                });
            }
        }
        previous = Some(date);
    }
    Ok(())
}

fn metric_position(metrics: &[String], name: &str) -> Result<usize, ReconError> {
    metrics.iter().position(|m| m == name).ok_or_else(|| {
        ReconError::ConfigValidation(format!("unknown metric '{name}'"))
    })
}

// ---------------------------------------------------------------------------
// Sum rules
// ---------------------------------------------------------------------------

struct ResolvedRule<'a> {
    rule: &'a SumRule,
    total: usize,
    parts: Vec<usize>,
}

fn resolve_rules<'a>(
    metrics: &[String],
    rules: &'a [SumRule],
) -> Result<Vec<ResolvedRule<'a>>, ReconError> {
    rules
        .iter()
        .map(|rule| {
            Ok(ResolvedRule {
                rule,
                total: metric_position(metrics, &rule.total)?,
                parts: rule
                    .parts
                    .iter()
                    .map(|p| metric_position(metrics, p))
                    .collect::<Result<_, _>>()?,
            })
        })
        .collect()
}

impl ResolvedRule<'_> {
    fn check(&self, snapshot: &CumulativeSnapshot, prefix: &str) -> Option<Finding> {
        let value = |i: usize| snapshot.metric_values.get(i).copied().unwrap_or(0);
        let total = value(self.total);
        let sum: i64 = self.parts.iter().map(|&i| value(i)).sum();
        if total == sum {
            return None;
        }
        Some(Finding::new(
            FindingKind::SumMismatch,
            SourceTag::Cumulative,
            snapshot.date,
            format!(
                "{prefix}: {} {total} does not equal {} {sum} (difference {:+})",
                self.rule.total,
                self.rule.parts.join(" + "),
                total - sum
            ),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tag audit
// ---------------------------------------------------------------------------

/// Per date: facts carrying the unknown sentinel, and which dimensions it hit.
/// Confirmed delta per date with the start of the span it covers (exclusive).
///
/// A delta covers everything since the previous snapshot, so a skipped day
/// widens the span. Without snapshots the previous delta date bounds it, and
/// the first delta covers its own day only.
fn delta_spans(
    deltas: &[DeltaPoint],
    snapshots: &BTreeMap<NaiveDate, &CumulativeSnapshot>,
    confirmed: usize,
) -> BTreeMap<NaiveDate, (NaiveDate, i64)> {
    let mut spans = BTreeMap::new();
    let mut previous: Option<NaiveDate> = None;

    for point in deltas {
        let Some(&delta) = point.metric_deltas.get(confirmed) else {
            continue;
        };
        let since = snapshots
            .range(..point.date)
            .next_back()
            .map(|(date, _)| *date)
            .or(previous)
            .or_else(|| point.date.pred_opt())
            .unwrap_or(point.date);
        spans.insert(point.date, (since, delta));
        previous = Some(point.date);
    }
    spans
}

fn unknown_tag_counts(facts: &[CanonicalFact]) -> BTreeMap<NaiveDate, (u64, BTreeSet<String>)> {
    let mut out: BTreeMap<NaiveDate, (u64, BTreeSet<String>)> = BTreeMap::new();
    for fact in facts {
        let dims: Vec<&String> = fact
            .tags
            .iter()
            .filter(|(_, values)| values.contains(UNKNOWN_TAG))
            .map(|(dim, _)| dim)
            .collect();
        if dims.is_empty() {
            continue;
        }
        let entry = out.entry(fact.date).or_default();
        entry.0 += fact.count;
        entry.1.extend(dims.into_iter().cloned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AGE_DIMENSION;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn totals(start: u32, values: &[u64]) -> Vec<DailySeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut p = DailySeriesPoint::zero(d(start + i as u32));
                p.grand_total = *v;
                p
            })
            .collect()
    }

    fn deltas(start: u32, values: &[i64]) -> Vec<DeltaPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DeltaPoint {
                date: d(start + i as u32),
                metric_deltas: vec![*v],
            })
            .collect()
    }

    fn metrics() -> Vec<String> {
        vec!["confirmed".into()]
    }

    fn input<'a>(
        cases: &'a [DailySeriesPoint],
        agg: &'a [DailySeriesPoint],
        deltas: &'a [DeltaPoint],
        metrics: &'a [String],
    ) -> ValidationInput<'a> {
        ValidationInput {
            case_facts: &[],
            case_totals: cases,
            aggregate_totals: agg,
            snapshots: &[],
            deltas,
            metrics,
            confirmed_metric: "confirmed",
            sum_rules: &[],
        }
    }

    #[test]
    fn agreeing_sources_produce_nothing() {
        let cases = totals(1, &[2, 0, 1]);
        let agg = totals(1, &[2, 0, 1]);
        let dl = deltas(2, &[0, 1]);
        let m = metrics();
        assert!(validate(&input(&cases, &agg, &dl, &m)).unwrap().is_empty());
    }

    #[test]
    fn aggregate_mismatch_carries_signed_difference() {
        let cases = totals(1, &[2, 3]);
        let agg = totals(1, &[2, 5]);
        let m = metrics();
        let findings = validate(&input(&cases, &agg, &[], &m)).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, Some(FindingKind::CaseVsAggregate));
        assert_eq!(findings[0].source, SourceTag::Cases);
        assert!(findings[0].message.starts_with("2024/01/02 (01/02): "));
        assert!(findings[0].message.contains("(difference -2)"));
    }

    #[test]
    fn aggregate_skipped_past_its_last_date() {
        let cases = totals(1, &[2, 3, 4]);
        let agg = totals(1, &[2]);
        let m = metrics();
        assert!(validate(&input(&cases, &agg, &[], &m)).unwrap().is_empty());
    }

    #[test]
    fn cumulative_checks_start_at_first_delta() {
        let cases = totals(1, &[5, 1, 1]);
        let dl = deltas(2, &[1, 2]);
        let m = metrics();
        let findings = validate(&input(&cases, &[], &dl, &m)).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, Some(FindingKind::CaseVsCumulative));
        assert_eq!(findings[0].source, SourceTag::Cumulative);
        assert_eq!(findings[0].date, Some(d(3)));
        assert!(findings[0].message.contains("(difference -1)"));
    }

    #[test]
    fn skipped_snapshot_day_sums_the_cases_in_between() {
        let cases = totals(1, &[1, 1, 1]);
        let snaps = vec![
            CumulativeSnapshot { date: d(1), metric_values: vec![1] },
            CumulativeSnapshot { date: d(3), metric_values: vec![3] },
        ];
        let dl = vec![DeltaPoint { date: d(3), metric_deltas: vec![2] }];
        let m = metrics();
        let mut inp = input(&cases, &[], &dl, &m);
        inp.snapshots = &snaps;
        assert!(validate(&inp).unwrap().is_empty());

        let dl = vec![DeltaPoint { date: d(3), metric_deltas: vec![3] }];
        inp.deltas = &dl;
        let findings = validate(&inp).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0]
            .message
            .contains("per-case total 2 since 01/01 does not match cumulative confirmed delta 3 (difference -1)"));
    }

    #[test]
    fn dates_before_first_case_are_not_compared() {
        let cases = totals(3, &[2]);
        let agg = totals(1, &[4, 1, 2]);
        let dl = deltas(2, &[5]);
        let m = metrics();
        assert!(validate(&input(&cases, &agg, &dl, &m)).unwrap().is_empty());
    }

    #[test]
    fn explained_mismatch_is_demoted_to_cases() {
        let cases = totals(1, &[1, 3]);
        let agg = totals(1, &[1, 4]);
        let dl = deltas(2, &[4]);
        let m = metrics();
        let findings = validate(&input(&cases, &agg, &dl, &m)).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, Some(FindingKind::CaseVsAggregate));
        assert_eq!(findings[1].kind, Some(FindingKind::CaseVsCumulative));
        assert_eq!(findings[1].source, SourceTag::Cases);
    }

    #[test]
    fn sum_rule_mismatch() {
        let m: Vec<String> = vec!["confirmed".into(), "hospitalized".into(), "mild".into(), "severe".into()];
        let snaps = vec![CumulativeSnapshot {
            date: d(1),
            metric_values: vec![10, 6, 4, 1],
        }];
        let rules = vec![SumRule {
            total: "hospitalized".into(),
            parts: vec!["mild".into(), "severe".into()],
        }];
        let inp = ValidationInput {
            case_facts: &[],
            case_totals: &[],
            aggregate_totals: &[],
            snapshots: &snaps,
            deltas: &[],
            metrics: &m,
            confirmed_metric: "confirmed",
            sum_rules: &rules,
        };
        let findings = validate(&inp).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, Some(FindingKind::SumMismatch));
        assert!(findings[0]
            .message
            .contains("hospitalized 6 does not equal mild + severe 5 (difference +1)"));
    }

    #[test]
    fn unknown_tags_are_audited() {
        let facts = vec![
            CanonicalFact::new(d(1), 1).with_tag(AGE_DIMENSION, UNKNOWN_TAG),
            CanonicalFact::new(d(1), 1).with_tag(AGE_DIMENSION, UNKNOWN_TAG),
            CanonicalFact::new(d(1), 1).with_tag(AGE_DIMENSION, "20-29"),
        ];
        let cases = totals(1, &[3]);
        let m = metrics();
        let mut inp = input(&cases, &[], &[], &m);
        inp.case_facts = &facts;
        let findings = validate(&inp).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, Some(FindingKind::MalformedTag));
        assert!(findings[0].message.contains("2 case record(s) with unreadable age_bucket"));
    }

    #[test]
    fn unordered_series_is_precondition_error() {
        let mut cases = totals(1, &[1, 1]);
        cases.swap(0, 1);
        let m = metrics();
        let err = validate(&input(&cases, &[], &[], &m)).unwrap_err();
        assert!(err.is_precondition());
    }
}
