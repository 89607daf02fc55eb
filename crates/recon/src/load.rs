//! CSV exports of the three sources into raw records.
//!
//! One header row, ISO dates. Columns are looked up by name.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::{CaseSourceConfig, CumulativeSourceConfig, DailySourceConfig};
use crate::error::ReconError;
use crate::model::{CumulativeSnapshot, RawCaseRecord, RawDailyRecord};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

struct Table {
    source: &'static str,
    headers: Vec<String>,
    reader: csv::Reader<std::io::Cursor<Vec<u8>>>,
}

impl Table {
    fn open(source: &'static str, csv_data: &str) -> Result<Self, ReconError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(std::io::Cursor::new(csv_data.as_bytes().to_vec()));

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ReconError::Io(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        Ok(Self {
            source,
            headers,
            reader,
        })
    }

    fn idx(&self, name: &str) -> Result<usize, ReconError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReconError::MissingColumn {
                source: self.source.into(),
                column: name.into(),
            })
    }

    fn records(&mut self) -> impl Iterator<Item = Result<(usize, csv::StringRecord), ReconError>> + '_ {
        self.reader
            .records()
            .enumerate()
            .map(|(i, r)| r.map(|rec| (i + 1, rec)).map_err(|e| ReconError::Io(e.to_string())))
    }
}

fn parse_date(source: &str, row: usize, value: &str) -> Result<NaiveDate, ReconError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ReconError::DateParse {
        source: source.into(),
        row,
        value: value.into(),
    })
}

fn parse_count<T: std::str::FromStr>(
    source: &str,
    row: usize,
    column: &str,
    value: &str,
) -> Result<T, ReconError> {
    value.replace(',', "").parse().map_err(|_| ReconError::CountParse {
        source: source.into(),
        row,
        column: column.into(),
        value: value.into(),
    })
}

// ---------------------------------------------------------------------------
// Per-case rows
// ---------------------------------------------------------------------------

pub fn load_case_rows(
    csv_data: &str,
    config: &CaseSourceConfig,
) -> Result<Vec<RawCaseRecord>, ReconError> {
    let mut table = Table::open("cases", csv_data)?;
    let col = &config.columns;

    let id_idx = table.idx(&col.id)?;
    let date_idx = table.idx(&col.date)?;
    let age_idx = table.idx(&col.age)?;
    let excluded_idx = col.excluded.as_deref().map(|c| table.idx(c)).transpose()?;
    let cluster_idx: Vec<(String, usize)> = col
        .clusters
        .iter()
        .map(|c| table.idx(c).map(|i| (c.clone(), i)))
        .collect::<Result<_, _>>()?;

    let flags: Vec<String> = col.flag_values.iter().map(|v| v.trim().to_lowercase()).collect();
    let is_set = |cell: &str| {
        let cell = cell.trim().to_lowercase();
        !cell.is_empty() && flags.contains(&cell)
    };

    let headers = table.headers.clone();
    let mut rows = Vec::new();

    for record in table.records() {
        let (row, record) = record?;
        let date = parse_date("cases", row, record.get(date_idx).unwrap_or(""))?;
        let age = record
            .get(age_idx)
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from);

        let clusters: BTreeMap<String, bool> = cluster_idx
            .iter()
            .map(|(name, i)| (name.clone(), is_set(record.get(*i).unwrap_or(""))))
            .collect();

        let excluded = excluded_idx.is_some_and(|i| is_set(record.get(i).unwrap_or("")));

        let mut raw_fields = BTreeMap::new();
        for (i, h) in headers.iter().enumerate() {
            if let Some(val) = record.get(i) {
                raw_fields.insert(h.clone(), val.to_string());
            }
        }

        rows.push(RawCaseRecord {
            row,
            id: record.get(id_idx).unwrap_or("").to_string(),
            date,
            age,
            clusters,
            excluded,
            raw_fields,
        });
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Daily aggregate rows
// ---------------------------------------------------------------------------

pub fn load_daily_rows(
    csv_data: &str,
    config: &DailySourceConfig,
) -> Result<Vec<RawDailyRecord>, ReconError> {
    let mut table = Table::open("daily", csv_data)?;
    let col = &config.columns;

    let date_idx = table.idx(&col.date)?;
    let positive_idx = table.idx(&col.positive)?;
    let tested_idx = col.tested.as_deref().map(|c| table.idx(c)).transpose()?;

    let mut rows = Vec::new();
    for record in table.records() {
        let (row, record) = record?;
        let date = parse_date("daily", row, record.get(date_idx).unwrap_or(""))?;
        let positive = parse_count("daily", row, &col.positive, record.get(positive_idx).unwrap_or(""))?;

        // A blank tested cell reads as no figure for the day.
        let tested = match (tested_idx, col.tested.as_deref()) {
            (Some(i), Some(name)) => match record.get(i).unwrap_or("") {
                "" => None,
                v => Some(parse_count("daily", row, name, v)?),
            },
            _ => None,
        };

        rows.push(RawDailyRecord {
            date,
            tested,
            positive,
        });
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Cumulative snapshot rows
// ---------------------------------------------------------------------------

pub fn load_snapshot_rows(
    csv_data: &str,
    config: &CumulativeSourceConfig,
) -> Result<Vec<CumulativeSnapshot>, ReconError> {
    let mut table = Table::open("cumulative", csv_data)?;

    let date_idx = table.idx(&config.date_column)?;
    let metric_idx: Vec<usize> = config
        .metrics
        .iter()
        .map(|m| table.idx(m))
        .collect::<Result<_, _>>()?;

    let mut rows = Vec::new();
    for record in table.records() {
        let (row, record) = record?;
        let date = parse_date("cumulative", row, record.get(date_idx).unwrap_or(""))?;
        let metric_values = config
            .metrics
            .iter()
            .zip(&metric_idx)
            .map(|(name, &i)| parse_count("cumulative", row, name, record.get(i).unwrap_or("")))
            .collect::<Result<Vec<i64>, _>>()?;

        rows.push(CumulativeSnapshot {
            date,
            metric_values,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaseColumns, DailyColumns};

    fn case_config() -> CaseSourceConfig {
        CaseSourceConfig {
            file: "cases.csv".into(),
            exclude_ids: vec![],
            columns: CaseColumns {
                id: "no".into(),
                date: "date".into(),
                age: "age".into(),
                excluded: Some("excluded".into()),
                clusters: vec!["hospital_a".into(), "nursery_b".into()],
                flag_values: vec!["〇".into(), "1".into()],
            },
        }
    }

    #[test]
    fn load_cases_basic() {
        let csv = "\
no,date,age,sex,hospital_a,nursery_b,excluded
1,2024-01-01,20代,F,〇,,
2,2024-01-01,,M,,1,
3,2024-01-02,非公表,M,,,〇
";
        let rows = load_case_rows(csv, &case_config()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].age.as_deref(), Some("20代"));
        assert!(rows[0].clusters["hospital_a"]);
        assert!(!rows[0].clusters["nursery_b"]);
        assert!(rows[1].age.is_none());
        assert!(rows[1].clusters["nursery_b"]);
        assert!(rows[2].excluded);
        assert_eq!(rows[0].raw_fields["sex"], "F");
    }

    #[test]
    fn missing_cluster_column() {
        let csv = "no,date,age,hospital_a,excluded\n1,2024-01-01,20,,\n";
        let err = load_case_rows(csv, &case_config()).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column, .. } if column == "nursery_b"));
    }

    #[test]
    fn bad_date_names_the_row() {
        let csv = "\
no,date,age,hospital_a,nursery_b,excluded
1,2024-01-01,20,,,
2,01/02/2024,20,,,
";
        let err = load_case_rows(csv, &case_config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "source 'cases', row 2: cannot parse date '01/02/2024'"
        );
    }

    #[test]
    fn load_daily_with_blank_tested() {
        let config = DailySourceConfig {
            file: "daily.csv".into(),
            columns: DailyColumns {
                date: "date".into(),
                tested: Some("tested".into()),
                positive: "positive".into(),
            },
        };
        let csv = "date,tested,positive\n2024-01-01,\"1,204\",3\n2024-01-02,,0\n";
        let rows = load_daily_rows(csv, &config).unwrap();
        assert_eq!(rows[0].tested, Some(1204));
        assert_eq!(rows[1].tested, None);
        assert_eq!(rows[1].positive, 0);
    }

    #[test]
    fn negative_positive_count_rejected() {
        let config = DailySourceConfig {
            file: "daily.csv".into(),
            columns: DailyColumns {
                date: "date".into(),
                tested: None,
                positive: "positive".into(),
            },
        };
        let err = load_daily_rows("date,positive\n2024-01-01,-1\n", &config).unwrap_err();
        assert!(matches!(err, ReconError::CountParse { .. }));
    }

    #[test]
    fn load_snapshots_in_metric_order() {
        let config = CumulativeSourceConfig {
            file: "summary.csv".into(),
            date_column: "date".into(),
            metrics: vec!["confirmed".into(), "tested".into()],
        };
        let csv = "date,tested,confirmed\n2024-01-01,100,10\n2024-01-02,120,-1\n";
        let rows = load_snapshot_rows(csv, &config).unwrap();
        assert_eq!(rows[0].metric_values, vec![10, 100]);
        assert_eq!(rows[1].metric_values, vec![-1, 120]);
    }
}
