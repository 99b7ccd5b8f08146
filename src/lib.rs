//! `data-preproc` prepares record datasets for downstream model use by running them through an
//! ordered, configurable chain of processors.
//!
//! The moving parts:
//!
//! - [`processing::ProcessorRegistry`]: maps processor names to constructors; built once at
//!   startup and passed by reference
//! - [`processing::Processor`]: the contract every processor implements (required columns,
//!   per-record transform returning an explicit [`processing::Outcome`], optional
//!   whole-dataset transform)
//! - [`execution::Pipeline`]: builds processors from a [`config::PipelineConfig`] and applies
//!   them to a [`types::DataSet`] in declared order, reporting kept/dropped counts per stage
//!
//! Bundled processors:
//!
//! - `longest_explanation_mapping` ([`processing::longest_explanation`]): pick the QA triple
//!   with the longest explanation and emit `problem` / `solution` fields
//! - `image_format_converter` ([`processing::image_format`]): normalize image columns to
//!   decoded images or canonical PNG bytes
//!
//! ## Quick example
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use data_preproc::config::PipelineConfig;
//! use data_preproc::execution::Pipeline;
//! use data_preproc::processing::ProcessorRegistry;
//! use data_preproc::types::{DataSet, Record, Value};
//!
//! let cfg = PipelineConfig::from_yaml_str(
//!     r#"
//! processors:
//!   - type: longest_explanation_mapping
//!     keep_unmapped: false
//! "#,
//! )
//! .unwrap();
//!
//! let mut qa = BTreeMap::new();
//! qa.insert("question".to_string(), Value::from("What is 2 + 3?"));
//! qa.insert("explanation".to_string(), Value::from("Adding 2 and 3 gives 5."));
//! qa.insert("answer".to_string(), Value::from("5"));
//! let mut record = Record::new();
//! record.insert("qa_pairs".to_string(), Value::Struct(qa));
//!
//! let registry = ProcessorRegistry::with_builtin();
//! let pipeline = Pipeline::build(&registry, &cfg.processors).unwrap();
//! let run = pipeline.run(DataSet::from_records(vec![record])).unwrap();
//!
//! assert_eq!(run.reports[0].kept, 1);
//! assert_eq!(
//!     run.dataset.records[0].get("solution"),
//!     Some(&Value::from("Adding 2 and 3 gives 5.\n\nThe answer is \\boxed{5}."))
//! );
//! ```
//!
//! ## Modules
//!
//! - [`types`]: records, values, schema, and the in-memory dataset
//! - [`config`]: pipeline / processor configuration (JSON or YAML)
//! - [`processing`]: processor contract, registry, and bundled processors
//! - [`execution`]: pipeline executor, observers, sharded mapping
//! - [`ingestion`] / [`persist`]: JSON/NDJSON dataset source and NDJSON sink
//! - [`error`]: error types used across the crate
//!
//! Logging goes through `tracing`; install a subscriber in the host binary to see it.

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod persist;
pub mod processing;
pub mod types;

pub use error::{ConversionError, PipelineError, PipelineResult};
