//! `casebook-io`: file-backed collaborators of the recon engine.
//!
//! A directory of JSON artifacts serves as previous state, publish sink and
//! home of the persisted finding list; a directory of JSON schemas validates
//! changed artifacts before they are written.

pub mod error;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use schema::SchemaSet;
pub use store::{parse_findings, JsonStore, FINDINGS_ARTIFACT};
