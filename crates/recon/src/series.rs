//! Daily series building: per-day folding with zero-filled gaps.

use chrono::NaiveDate;

use crate::model::{CanonicalFact, DailySeriesPoint};

/// Which tag dimension a series is bucketed on, and its full category list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesSpec<'a> {
    /// `None` builds plain totals with empty `totals` maps.
    pub dimension: Option<&'a str>,
    /// Every tag value that must appear on every point, even at zero.
    pub categories: Option<&'a [String]>,
}

impl<'a> SeriesSpec<'a> {
    pub fn totals() -> Self {
        Self::default()
    }

    pub fn by(dimension: &'a str, categories: &'a [String]) -> Self {
        Self {
            dimension: Some(dimension),
            categories: Some(categories),
        }
    }
}

/// Build a contiguous daily series from unordered facts.
///
/// One point per date from the earliest fact through `until` (inclusive), or
/// through the last fact if that is later. Empty input yields an empty series.
pub fn build_daily_series(
    facts: &[CanonicalFact],
    spec: &SeriesSpec<'_>,
    until: NaiveDate,
) -> Vec<DailySeriesPoint> {
    let mut ordered: Vec<&CanonicalFact> = facts.iter().collect();
    // Stable: ties keep input order.
    ordered.sort_by_key(|f| f.date);

    let mut series: Vec<DailySeriesPoint> = Vec::new();

    for fact in ordered {
        match series.last().map(|p| p.date) {
            Some(last) if last == fact.date => {}
            Some(last) => {
                let mut day = last;
                while let Some(next) = day.succ_opt().filter(|n| *n < fact.date) {
                    series.push(empty_point(next, spec));
                    day = next;
                }
                series.push(empty_point(fact.date, spec));
            }
            None => series.push(empty_point(fact.date, spec)),
        }

        let Some(point) = series.last_mut() else {
            continue;
        };
        point.grand_total += fact.count;
        if let Some(dimension) = spec.dimension {
            for tag in fact.tag_values(dimension) {
                *point.totals.entry(tag.to_string()).or_insert(0) += fact.count;
            }
        }
    }

    if let Some(last) = series.last().map(|p| p.date) {
        let mut day = last;
        while let Some(next) = day.succ_opt().filter(|n| *n <= until) {
            series.push(empty_point(next, spec));
            day = next;
        }
    }

    series
}

fn empty_point(date: NaiveDate, spec: &SeriesSpec<'_>) -> DailySeriesPoint {
    let mut point = DailySeriesPoint::zero(date);
    if let Some(categories) = spec.categories {
        for c in categories {
            point.totals.insert(c.clone(), 0);
        }
    }
    point
}
