//! Previous state read from the published site over HTTP.

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use casebook_recon::{PreviousState, ReconError};

/// Reads `<base>/<name>.json` from each base URL in turn.
///
/// A 404 counts as "not published" at that base. The first base that
/// returns a document wins. Only when every base fails outright does the
/// lookup fail.
pub struct HttpPrevious {
    http: reqwest::blocking::Client,
    bases: Vec<String>,
}

impl HttpPrevious {
    pub fn new(bases: Vec<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: crate::http::client()?,
            bases,
        })
    }

    fn fetch(&self, url: &str) -> Result<Option<Value>, String> {
        let resp = self.http.get(url).send().map_err(|e| e.to_string())?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = resp.text().map_err(|e| e.to_string())?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| format!("invalid JSON: {e}"))
    }
}

fn artifact_url(base: &str, name: &str) -> String {
    format!("{}/{name}.json", base.trim_end_matches('/'))
}

impl PreviousState for HttpPrevious {
    fn previous(&self, name: &str) -> Result<Option<Value>, ReconError> {
        let mut failures = Vec::new();

        for base in &self.bases {
            let url = artifact_url(base, name);
            match self.fetch(&url) {
                Ok(Some(value)) => {
                    debug!(url = %url, "fetched previous artifact");
                    return Ok(Some(value));
                }
                Ok(None) => debug!(url = %url, "artifact not published"),
                Err(e) => {
                    warn!(url = %url, error = %e, "previous state fetch failed");
                    failures.push(format!("{url}: {e}"));
                }
            }
        }

        if !failures.is_empty() && failures.len() == self.bases.len() {
            return Err(ReconError::Io(format!(
                "cannot fetch previous '{name}': {}",
                failures.join("; ")
            )));
        }
        Ok(None)
    }
}
