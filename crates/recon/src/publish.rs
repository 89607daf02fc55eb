//! Change-gated publication.
//!
//! [`plan`] builds every registered artifact, compares it with what was last
//! published and validates only the ones that changed. Nothing is written
//! until [`commit`], so a schema violation leaves the previous state intact.

use std::fmt;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ReconError;

pub const LAST_UPDATE_ARTIFACT: &str = "last_update";

/// Format of every published timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M";

// ---------------------------------------------------------------------------
// Collaborator interfaces
// ---------------------------------------------------------------------------

/// Where the last published version of an artifact is read from.
pub trait PreviousState {
    /// `Ok(None)` when nothing was published under `name` yet.
    fn previous(&self, name: &str) -> Result<Option<Value>, ReconError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub detail: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.detail)
        } else {
            write!(f, "{}: {}", self.path, self.detail)
        }
    }
}

pub trait SchemaValidator {
    fn validate(&self, schema: &str, value: &Value) -> Result<(), SchemaViolation>;
}

/// Atomic per-artifact writer.
pub trait PublishSink {
    fn publish(&mut self, name: &str, value: &Value) -> Result<(), ReconError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One registry entry: artifact name, schema name, builder.
pub struct ArtifactSpec<I> {
    pub name: &'static str,
    pub schema: &'static str,
    pub build: fn(&I) -> Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedArtifact {
    pub name: String,
    pub value: Value,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishPlan {
    pub artifacts: Vec<PlannedArtifact>,
    pub any_changed: bool,
    pub last_update: Value,
}

impl PublishPlan {
    pub fn changed_names(&self) -> Vec<&str> {
        self.artifacts
            .iter()
            .filter(|a| a.changed)
            .map(|a| a.name.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Plan + commit
// ---------------------------------------------------------------------------

/// Build, compare and validate every entry. `now` is the already formatted
/// timestamp that `last_update` advances to when anything changed.
pub fn plan<I>(
    registry: &[ArtifactSpec<I>],
    input: &I,
    previous: &dyn PreviousState,
    validator: &dyn SchemaValidator,
    now: &str,
) -> Result<PublishPlan, ReconError> {
    let mut artifacts = Vec::with_capacity(registry.len());

    for spec in registry {
        let fresh = (spec.build)(input);
        let prior = previous.previous(spec.name)?;
        let changed = !matches!(&prior, Some(p) if !is_blank(p) && *p == fresh);

        if changed {
            validator
                .validate(spec.schema, &fresh)
                .map_err(|v| ReconError::SchemaViolation {
                    artifact: spec.name.to_string(),
                    detail: v.to_string(),
                })?;
        }
        debug!(artifact = spec.name, changed, "planned artifact");

        artifacts.push(PlannedArtifact {
            name: spec.name.to_string(),
            value: fresh,
            changed,
        });
    }

    let any_changed = artifacts.iter().any(|a| a.changed);
    let last_update = if any_changed {
        json!({ "last_update": now })
    } else {
        match previous.previous(LAST_UPDATE_ARTIFACT)? {
            Some(prior) if !is_blank(&prior) => prior,
            _ => json!({ "last_update": now }),
        }
    };

    info!(
        artifacts = artifacts.len(),
        changed = artifacts.iter().filter(|a| a.changed).count(),
        "publication planned"
    );

    Ok(PublishPlan {
        artifacts,
        any_changed,
        last_update,
    })
}

/// Write every planned artifact, then `last_update`.
pub fn commit(plan: &PublishPlan, sink: &mut dyn PublishSink) -> Result<(), ReconError> {
    for artifact in &plan.artifacts {
        sink.publish(&artifact.name, &artifact.value)?;
    }
    sink.publish(LAST_UPDATE_ARTIFACT, &plan.last_update)?;
    info!(count = plan.artifacts.len() + 1, "artifacts published");
    Ok(())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct Previous(HashMap<&'static str, Value>);

    impl PreviousState for Previous {
        fn previous(&self, name: &str) -> Result<Option<Value>, ReconError> {
            Ok(self.0.get(name).cloned())
        }
    }

    /// Rejects any value whose `bad` key is true; records what it saw.
    #[derive(Default)]
    struct Validator {
        seen: RefCell<Vec<String>>,
    }

    impl SchemaValidator for Validator {
        fn validate(&self, schema: &str, value: &Value) -> Result<(), SchemaViolation> {
            self.seen.borrow_mut().push(schema.to_string());
            if value.get("bad") == Some(&Value::Bool(true)) {
                return Err(SchemaViolation {
                    path: "/bad".into(),
                    detail: "must not be true".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sink(Vec<(String, Value)>);

    impl PublishSink for Sink {
        fn publish(&mut self, name: &str, value: &Value) -> Result<(), ReconError> {
            self.0.push((name.to_string(), value.clone()));
            Ok(())
        }
    }

    fn registry() -> Vec<ArtifactSpec<Value>> {
        vec![
            ArtifactSpec {
                name: "first",
                schema: "first",
                build: |v| v["first"].clone(),
            },
            ArtifactSpec {
                name: "second",
                schema: "second",
                build: |v| v["second"].clone(),
            },
        ]
    }

    const NOW: &str = "2024/01/05 10:00";

    #[test]
    fn unchanged_input_keeps_last_update_and_skips_validation() {
        let input = json!({"first": {"a": 1, "b": 2}, "second": {"x": []}});
        let previous = Previous(HashMap::from([
            ("first", json!({"b": 2, "a": 1})),
            ("second", json!({"x": []})),
            (LAST_UPDATE_ARTIFACT, json!({"last_update": "2024/01/01 00:00"})),
        ]));
        let validator = Validator::default();
        let plan = plan(&registry(), &input, &previous, &validator, NOW).unwrap();

        assert!(!plan.any_changed);
        assert!(validator.seen.borrow().is_empty());
        assert_eq!(plan.last_update, json!({"last_update": "2024/01/01 00:00"}));
    }

    #[test]
    fn changed_artifact_advances_last_update() {
        let input = json!({"first": {"a": 1}, "second": {"x": [1]}});
        let previous = Previous(HashMap::from([
            ("first", json!({"a": 1})),
            ("second", json!({"x": []})),
            (LAST_UPDATE_ARTIFACT, json!({"last_update": "2024/01/01 00:00"})),
        ]));
        let validator = Validator::default();
        let plan = plan(&registry(), &input, &previous, &validator, NOW).unwrap();

        assert!(plan.any_changed);
        assert_eq!(plan.changed_names(), vec!["second"]);
        assert_eq!(*validator.seen.borrow(), vec!["second".to_string()]);
        assert_eq!(plan.last_update, json!({"last_update": NOW}));
    }

    #[test]
    fn missing_null_or_empty_previous_counts_as_changed() {
        let input = json!({"first": {}, "second": null});
        let previous = Previous(HashMap::from([("first", json!({})), ("second", Value::Null)]));
        let plan = plan(&registry(), &input, &previous, &Validator::default(), NOW).unwrap();
        assert!(plan.artifacts.iter().all(|a| a.changed));
    }

    #[test]
    fn violation_aborts_before_anything_is_written() {
        let input = json!({"first": {"ok": 1}, "second": {"bad": true}});
        let previous = Previous(HashMap::new());
        let err = plan(&registry(), &input, &previous, &Validator::default(), NOW).unwrap_err();
        assert!(matches!(err, ReconError::SchemaViolation { ref artifact, .. } if artifact == "second"));
        assert!(err.to_string().contains("/bad: must not be true"));
    }

    #[test]
    fn unchanged_invalid_artifact_is_republished() {
        let input = json!({"first": {"bad": true}, "second": {}});
        let previous = Previous(HashMap::from([("first", json!({"bad": true}))]));
        let plan = plan(&registry(), &input, &previous, &Validator::default(), NOW).unwrap();
        assert!(!plan.artifacts[0].changed);
    }

    #[test]
    fn commit_writes_everything_then_last_update() {
        let input = json!({"first": {"a": 1}, "second": {"b": 2}});
        let plan = plan(&registry(), &input, &Previous(HashMap::new()), &Validator::default(), NOW).unwrap();
        let mut sink = Sink::default();
        commit(&plan, &mut sink).unwrap();
        let names: Vec<&str> = sink.0.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "second", LAST_UPDATE_ARTIFACT]);
        assert_eq!(sink.0[2].1, json!({"last_update": NOW}));
    }
}
