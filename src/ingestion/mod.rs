//! Dataset source.
//!
//! Loads records from JSON (array-of-objects or a single object) and NDJSON into an in-memory
//! [`crate::types::DataSet`] with an inferred schema. See [`json`].

pub mod json;

pub use json::{ingest_json_from_path, ingest_json_from_str, value_from_json};
