//! `casebook-recon`: cross-source reconciliation of case, daily and cumulative counts.
//!
//! Pure engine crate: receives pre-loaded records, returns series, findings
//! and artifact values. No CLI or IO dependencies.

pub mod artifacts;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod load;
pub mod model;
pub mod normalize;
pub mod publish;
pub mod series;
pub mod summary;
pub mod validate;

pub use config::PipelineConfig;
pub use engine::run;
pub use error::ReconError;
pub use lifecycle::{reconcile, FindingIdentity, MessageIdentity, Reconciliation, StructuralIdentity};
pub use model::{Finding, PipelineInput, PipelineResult, RunOutcome};
pub use publish::{PreviousState, PublishSink, SchemaValidator, SchemaViolation};
