//! Cumulative delta extraction: day-over-day differences of running totals.
//!
//! Negative deltas are emitted as-is and reported as findings; ordering and
//! arity problems are precondition violations.

use tracing::debug;

use crate::error::ReconError;
use crate::model::{
    finding_prefix, CumulativeSnapshot, DeltaPoint, Finding, FindingKind, SourceTag,
};

pub const CUMULATIVE_SOURCE: &str = "cumulative";

#[derive(Debug, Clone, Default)]
pub struct DeltaReport {
    pub points: Vec<DeltaPoint>,
    pub findings: Vec<Finding>,
}

/// Require strictly increasing dates and one value per metric on every snapshot.
pub fn check_snapshots(snapshots: &[CumulativeSnapshot], metric_count: usize) -> Result<(), ReconError> {
    for s in snapshots {
        if s.metric_values.len() != metric_count {
            return Err(ReconError::MetricArity {
                date: s.date,
                expected: metric_count,
                found: s.metric_values.len(),
            });
        }
    }
    for pair in snapshots.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.date == next.date {
            return Err(ReconError::DuplicateDate {
                source: CUMULATIVE_SOURCE.into(),
                date: next.date,
            });
        }
        if next.date < prev.date {
            return Err(ReconError::NonMonotonicDate {
                source: CUMULATIVE_SOURCE.into(),
                previous: prev.date,
                next: next.date,
            });
        }
    }
    Ok(())
}

/// One delta per snapshot after the first.
pub fn extract_deltas(
    snapshots: &[CumulativeSnapshot],
    metrics: &[String],
) -> Result<DeltaReport, ReconError> {
    check_snapshots(snapshots, metrics.len())?;

    let mut report = DeltaReport::default();
    for pair in snapshots.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let metric_deltas: Vec<i64> = prev
            .metric_values
            .iter()
            .zip(&next.metric_values)
            .map(|(p, n)| n - p)
            .collect();

        for (i, delta) in metric_deltas.iter().enumerate() {
            if *delta < 0 {
                report.findings.push(Finding::new(
                    FindingKind::NegativeDelta,
                    SourceTag::Cumulative,
                    next.date,
                    format!(
                        "{}: cumulative {} decreased from {} to {} (difference {:+})",
                        finding_prefix(next.date),
                        metrics[i],
                        prev.metric_values[i],
                        next.metric_values[i],
                        delta
                    ),
                ));
            }
        }

        report.points.push(DeltaPoint {
            date: next.date,
            metric_deltas,
        });
    }

    debug!(
        snapshots = snapshots.len(),
        deltas = report.points.len(),
        negative = report.findings.len(),
        "extracted cumulative deltas"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snap(day: u32, values: &[i64]) -> CumulativeSnapshot {
        CumulativeSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            metric_values: values.to_vec(),
        }
    }

    fn metrics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deltas_with_one_negative() {
        let snaps = vec![snap(1, &[10]), snap(2, &[15]), snap(3, &[15]), snap(4, &[12])];
        let report = extract_deltas(&snaps, &metrics(&["confirmed"])).unwrap();
        let deltas: Vec<i64> = report.points.iter().map(|p| p.metric_deltas[0]).collect();
        assert_eq!(deltas, vec![5, 0, -3]);

        assert_eq!(report.findings.len(), 1);
        let f = &report.findings[0];
        assert_eq!(f.source, SourceTag::Cumulative);
        assert_eq!(f.kind, Some(FindingKind::NegativeDelta));
        assert!(f.message.contains("(difference -3)"), "{}", f.message);
        assert!(f.message.starts_with("2024/01/04 (01/04)"));
    }

    #[test]
    fn first_snapshot_has_no_delta() {
        let report = extract_deltas(&[snap(1, &[3, 4])], &metrics(&["a", "b"])).unwrap();
        assert!(report.points.is_empty());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn duplicate_date_is_fatal() {
        let snaps = vec![snap(1, &[1]), snap(1, &[2])];
        let err = extract_deltas(&snaps, &metrics(&["a"])).unwrap_err();
        assert!(matches!(err, ReconError::DuplicateDate { .. }));
        assert!(err.is_precondition());
    }

    #[test]
    fn decreasing_date_is_fatal() {
        let snaps = vec![snap(2, &[1]), snap(1, &[2])];
        let err = extract_deltas(&snaps, &metrics(&["a"])).unwrap_err();
        assert!(matches!(err, ReconError::NonMonotonicDate { .. }));
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        let snaps = vec![snap(1, &[1, 2]), snap(2, &[2])];
        let err = extract_deltas(&snaps, &metrics(&["a", "b"])).unwrap_err();
        assert!(err.to_string().contains("expected 2 metric(s), found 1"));
    }

    #[test]
    fn each_metric_reported_independently() {
        let snaps = vec![snap(1, &[5, 9]), snap(2, &[4, 8])];
        let report = extract_deltas(&snaps, &metrics(&["a", "b"])).unwrap();
        assert_eq!(report.findings.len(), 2);
        assert!(report.findings[0].message.contains("cumulative a decreased from 5 to 4"));
        assert!(report.findings[1].message.contains("cumulative b decreased from 9 to 8"));
    }
}
