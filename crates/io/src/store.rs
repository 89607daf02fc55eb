use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use casebook_recon::{Finding, PreviousState, PublishSink, ReconError};

use crate::error::StoreError;

/// Artifact name of the persisted finding list.
pub const FINDINGS_ARTIFACT: &str = "warnings";

/// A directory of `<name>.json` files.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    /// `Ok(None)` when the file does not exist or is empty.
    pub fn read(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::read(&path, e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::parse(&path, e))
    }

    /// Pretty-printed, written to a temp file and renamed into place.
    pub fn write(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::write(&self.root, e))?;

        let path = self.path_for(name);
        let tmp_path = path.with_extension("json.tmp");
        let mut body = serde_json::to_string_pretty(value).map_err(|e| StoreError::write(&path, e))?;
        body.push('\n');

        std::fs::write(&tmp_path, body).map_err(|e| StoreError::write(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| StoreError::write(&path, e))?;
        debug!(path = %path.display(), "wrote artifact");
        Ok(())
    }

    /// The persisted finding list; empty when none was stored yet.
    pub fn load_findings(&self) -> Result<Vec<Finding>, StoreError> {
        parse_findings(self.read(FINDINGS_ARTIFACT)?)
            .map_err(|e| StoreError::parse(&self.path_for(FINDINGS_ARTIFACT), e))
    }

    pub fn save_findings(&self, findings: &[Finding]) -> Result<(), StoreError> {
        let value = serde_json::to_value(findings)
            .map_err(|e| StoreError::write(&self.path_for(FINDINGS_ARTIFACT), e))?;
        self.write(FINDINGS_ARTIFACT, &value)
    }
}

/// Decode a finding list read from any previous-state source.
pub fn parse_findings(value: Option<Value>) -> Result<Vec<Finding>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value),
    }
}

impl PreviousState for JsonStore {
    fn previous(&self, name: &str) -> Result<Option<Value>, ReconError> {
        Ok(self.read(name)?)
    }
}

impl PublishSink for JsonStore {
    fn publish(&mut self, name: &str, value: &Value) -> Result<(), ReconError> {
        Ok(self.write(name, value)?)
    }
}
