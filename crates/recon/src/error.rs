use std::fmt;

use chrono::NaiveDate;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (unknown metric, bad age bounds, etc.).
    ConfigValidation(String),
    /// Missing required column in a source file.
    MissingColumn { source: String, column: String },
    /// Date parse error.
    DateParse { source: String, row: usize, value: String },
    /// Count parse error.
    CountParse { source: String, row: usize, column: String, value: String },
    /// Two cumulative snapshots share a date.
    DuplicateDate { source: String, date: NaiveDate },
    /// Dates go backwards where a strictly increasing order is required.
    NonMonotonicDate { source: String, previous: NaiveDate, next: NaiveDate },
    /// A snapshot carries a different number of metrics than configured.
    MetricArity { date: NaiveDate, expected: usize, found: usize },
    /// A source that must have at least one row is empty.
    EmptySource(String),
    /// A changed artifact failed its schema.
    SchemaViolation { artifact: String, detail: String },
    /// IO error surfaced by a collaborator (previous state, sink).
    Io(String),
}

impl ReconError {
    /// Shape violations of the pipeline's own invariants (not data content).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::DateParse { .. }
                | Self::CountParse { .. }
                | Self::DuplicateDate { .. }
                | Self::NonMonotonicDate { .. }
                | Self::MetricArity { .. }
                | Self::EmptySource(_)
        )
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "source '{source}': missing column '{column}'")
            }
            Self::DateParse { source, row, value } => {
                write!(f, "source '{source}', row {row}: cannot parse date '{value}'")
            }
            Self::CountParse { source, row, column, value } => {
                write!(f, "source '{source}', row {row}: cannot parse '{column}' value '{value}'")
            }
            Self::DuplicateDate { source, date } => {
                write!(f, "source '{source}': more than one entry for {date}")
            }
            Self::NonMonotonicDate { source, previous, next } => {
                write!(f, "source '{source}': date {next} follows {previous}; dates must increase")
            }
            Self::MetricArity { date, expected, found } => {
                write!(f, "snapshot {date}: expected {expected} metric(s), found {found}")
            }
            Self::EmptySource(source) => write!(f, "source '{source}' has no rows"),
            Self::SchemaViolation { artifact, detail } => {
                write!(f, "artifact '{artifact}' violates its schema: {detail}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
