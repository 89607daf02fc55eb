//! Registry of published artifacts and their JSON shapes.

use chrono::{Datelike, NaiveDate};
use serde_json::{json, Map, Value};

use crate::model::{short_date, DailySeriesPoint, PipelineResult, AGE_DIMENSION, CLUSTER_DIMENSION};
use crate::publish::ArtifactSpec;

/// Every artifact, in publication order. Each is validated against the
/// schema of the same name.
pub static REGISTRY: &[ArtifactSpec<PipelineResult>] = &[
    ArtifactSpec {
        name: "patients",
        schema: "patients",
        build: patients,
    },
    ArtifactSpec {
        name: "patients_summary",
        schema: "patients_summary",
        build: patients_summary,
    },
    ArtifactSpec {
        name: "clusters",
        schema: "clusters",
        build: clusters,
    },
    ArtifactSpec {
        name: "clusters_summary",
        schema: "clusters_summary",
        build: clusters_summary,
    },
    ArtifactSpec {
        name: "age_summary",
        schema: "age_summary",
        build: age_summary,
    },
    ArtifactSpec {
        name: "inspections",
        schema: "inspections",
        build: inspections,
    },
    ArtifactSpec {
        name: "inspections_summary",
        schema: "inspections_summary",
        build: inspections_summary,
    },
    ArtifactSpec {
        name: "main_summary",
        schema: "main_summary",
        build: main_summary,
    },
    ArtifactSpec {
        name: "sickbeds_summary",
        schema: "sickbeds_summary",
        build: sickbeds_summary,
    },
];

pub fn artifact_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|a| a.name).collect()
}

fn iso(date: NaiveDate) -> String {
    date.format(crate::load::DATE_FORMAT).to_string()
}

fn labels(series: &[DailySeriesPoint]) -> Vec<String> {
    series.iter().map(|p| short_date(p.date)).collect()
}

/// `{category: [n per day]}` over the given categories.
fn columns(series: &[DailySeriesPoint], categories: &[String]) -> Map<String, Value> {
    categories
        .iter()
        .map(|c| {
            let values: Vec<u64> = series.iter().map(|p| p.total_for(c)).collect();
            (c.clone(), json!(values))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Per-case artifacts
// ---------------------------------------------------------------------------

/// Day names as the published site shows them, Monday first.
const WEEKDAYS: [&str; 7] = ["月", "火", "水", "木", "金", "土", "日"];

fn weekday(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_monday() as usize]
}

fn patients(r: &PipelineResult) -> Value {
    let mut entries: Vec<_> = r.cases.iter().collect();
    entries.sort_by_key(|e| e.fact.date);
    entries.reverse();

    let data: Vec<Value> = entries
        .iter()
        .map(|e| {
            let age = e.fact.tag_values(AGE_DIMENSION).next().unwrap_or_default();
            let clusters: Vec<&str> = e.fact.tag_values(CLUSTER_DIMENSION).collect();
            json!({
                "no": e.id,
                "date": iso(e.fact.date),
                "weekday": weekday(e.fact.date),
                "age_bucket": age,
                "clusters": clusters,
                "fields": e.raw_fields,
            })
        })
        .collect();

    json!({ "data": data, "last_update": r.last_updates.cases })
}

fn patients_summary(r: &PipelineResult) -> Value {
    let data: Vec<Value> = r
        .case_totals
        .iter()
        .map(|p| json!({ "date": iso(p.date), "subtotal": p.grand_total }))
        .collect();
    json!({ "data": data, "last_update": r.last_updates.cases })
}

fn clusters(r: &PipelineResult) -> Value {
    let data: Vec<Value> = r
        .cluster_series
        .iter()
        .map(|p| {
            let mut row = Map::new();
            row.insert("date".into(), json!(iso(p.date)));
            for c in &r.cluster_categories {
                row.insert(c.clone(), json!(p.total_for(c)));
            }
            Value::Object(row)
        })
        .collect();
    json!({ "data": data, "last_update": r.last_updates.cases })
}

fn clusters_summary(r: &PipelineResult) -> Value {
    json!({
        "data": columns(&r.cluster_series, &r.cluster_categories),
        "labels": labels(&r.cluster_series),
        "last_update": r.last_updates.cases,
    })
}

fn age_summary(r: &PipelineResult) -> Value {
    json!({
        "data": columns(&r.age_series, &r.age_categories),
        "labels": labels(&r.age_series),
        "last_update": r.last_updates.cases,
    })
}

// ---------------------------------------------------------------------------
// Daily aggregate artifacts
// ---------------------------------------------------------------------------

fn inspections(r: &PipelineResult) -> Value {
    let data: Vec<Value> = r
        .daily
        .iter()
        .map(|d| {
            json!({
                "date": iso(d.date),
                "tested": d.tested.unwrap_or(0),
                "positive": d.positive,
            })
        })
        .collect();
    json!({ "data": data, "last_update": r.last_updates.daily })
}

fn inspections_summary(r: &PipelineResult) -> Value {
    let tested: Vec<u64> = r.daily.iter().map(|d| d.tested.unwrap_or(0)).collect();
    let positive: Vec<u64> = r.daily.iter().map(|d| d.positive).collect();
    let labels: Vec<String> = r.daily.iter().map(|d| short_date(d.date)).collect();
    json!({
        "data": { "tested": tested, "positive": positive },
        "labels": labels,
        "last_update": r.last_updates.daily,
    })
}

// ---------------------------------------------------------------------------
// Cumulative artifacts
// ---------------------------------------------------------------------------

fn main_summary(r: &PipelineResult) -> Value {
    let mut value = json!(r.summary);
    if let Value::Object(map) = &mut value {
        map.insert("last_update".into(), json!(r.last_updates.cumulative));
    }
    value
}

fn sickbeds_summary(r: &PipelineResult) -> Value {
    json!({
        "data": {
            "hospitalized": r.sickbeds.hospitalized,
            "remaining_beds": r.sickbeds.remaining_beds,
        },
        "last_update": r.last_updates.cumulative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_names_start_on_monday() {
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let names: Vec<&str> = (0..7)
            .map(|i| weekday(monday + chrono::Duration::days(i)))
            .collect();
        assert_eq!(names, ["月", "火", "水", "木", "金", "土", "日"]);
    }
}
