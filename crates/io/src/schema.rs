//! JSON schema validation for published artifacts.
//!
//! Each `<name>.json` schema is compiled once at load time; validation
//! reports the first violation with its instance path.

use std::collections::HashMap;
use std::path::Path;

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::debug;

use casebook_recon::{SchemaValidator, SchemaViolation};

use crate::error::StoreError;

/// Compiled schemas keyed by name (file stem).
#[derive(Default)]
pub struct SchemaSet {
    schemas: HashMap<String, JSONSchema>,
}

impl SchemaSet {
    pub fn from_schemas(schemas: HashMap<String, Value>) -> Result<Self, StoreError> {
        let mut compiled = HashMap::with_capacity(schemas.len());
        for (name, schema) in schemas {
            let validator = compile(&schema).map_err(|e| StoreError::parse(Path::new(&name), e))?;
            compiled.insert(name, validator);
        }
        Ok(Self { schemas: compiled })
    }

    /// Every `*.json` file in `dir`.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let entries = std::fs::read_dir(dir).map_err(|e| StoreError::read(dir, e))?;
        let mut schemas = HashMap::new();

        for entry in entries {
            let path = entry.map_err(|e| StoreError::read(dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(|e| StoreError::read(&path, e))?;
            let schema: Value =
                serde_json::from_str(&content).map_err(|e| StoreError::parse(&path, e))?;
            let validator = compile(&schema).map_err(|e| StoreError::parse(&path, e))?;
            schemas.insert(name.to_string(), validator);
        }

        debug!(dir = %dir.display(), count = schemas.len(), "loaded schemas");
        Ok(Self { schemas })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn compile(schema: &Value) -> Result<JSONSchema, String> {
    JSONSchema::compile(schema).map_err(|e| format!("invalid schema: {e}"))
}

impl SchemaValidator for SchemaSet {
    fn validate(&self, schema: &str, value: &Value) -> Result<(), SchemaViolation> {
        let Some(validator) = self.schemas.get(schema) else {
            return Err(SchemaViolation {
                path: String::new(),
                detail: format!("no schema named '{schema}'"),
            });
        };

        let first = match validator.validate(value) {
            Ok(()) => return Ok(()),
            Err(mut errors) => errors.next().map(|e| SchemaViolation {
                path: e.instance_path.to_string(),
                detail: e.to_string(),
            }),
        };
        Err(first.unwrap_or_else(|| SchemaViolation {
            path: String::new(),
            detail: "value does not match the schema".into(),
        }))
    }
}
