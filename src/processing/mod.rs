//! Processors: configurable units that transform or filter a [`crate::types::DataSet`].
//!
//! Every processor implements [`Processor`]. The per-record entry point,
//! [`Processor::process_example`], returns an explicit [`Outcome`]: either the transformed
//! record or [`Outcome::Drop`], which removes the record from every later stage. Processors
//! that need to act on the whole dataset at once (e.g. to retype a column in the schema)
//! override [`Processor::apply_to_dataset`]; everyone else gets the default per-record
//! map-and-filter from [`crate::execution::map_filter`].
//!
//! Processors are instantiated by name through a [`ProcessorRegistry`].
//!
//! Bundled processors:
//!
//! - [`longest_explanation`]: pick the QA triple with the longest explanation
//! - [`image_format`]: normalize image columns to decoded images or canonical bytes
//!
//! ## Example
//!
//! ```rust
//! use data_preproc::config::ProcessorConfig;
//! use data_preproc::processing::{Outcome, ProcessorRegistry};
//! use data_preproc::types::{Record, Value};
//!
//! let registry = ProcessorRegistry::with_builtin();
//! let mapper = registry
//!     .create("longest_explanation_mapping", &ProcessorConfig::new())
//!     .unwrap();
//!
//! let mut qa = std::collections::BTreeMap::new();
//! qa.insert("question".to_string(), Value::from("1+1?"));
//! qa.insert("explanation".to_string(), Value::from("One plus one is two."));
//! qa.insert("answer".to_string(), Value::from("2"));
//! let mut record = Record::new();
//! record.insert("qa_pairs".to_string(), Value::Struct(qa));
//!
//! let Outcome::Keep(out) = mapper.process_example(&record).unwrap() else {
//!     panic!("record should be kept");
//! };
//! assert_eq!(out.get("problem"), Some(&Value::from("1+1?")));
//! ```

pub mod image_format;
pub mod longest_explanation;
pub mod registry;

pub use registry::{Constructor, ProcessorRegistry};

use crate::error::PipelineResult;
use crate::types::{DataSet, Record};

/// Result of processing a single record.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome {
    /// The (possibly transformed) record continues to the next stage.
    Keep(Record),
    /// The record is permanently excluded from the output.
    Drop,
}

impl Outcome {
    /// `Some(record)` for [`Outcome::Keep`], `None` for [`Outcome::Drop`].
    pub fn into_option(self) -> Option<Record> {
        match self {
            Self::Keep(r) => Some(r),
            Self::Drop => None,
        }
    }

    /// Returns `true` for [`Outcome::Drop`].
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop)
    }
}

/// Contract implemented by every processor.
///
/// `process_example` must not mutate processor-owned state: it may be called repeatedly and,
/// through a sharded mapper, concurrently from several threads.
pub trait Processor: Send + Sync {
    /// Registry name of this processor, used in logs and error reports.
    fn name(&self) -> &str;

    /// Columns that must be present in the dataset schema before this processor runs.
    fn required_columns(&self) -> Vec<String>;

    /// Transform one record.
    fn process_example(&self, record: &Record) -> PipelineResult<Outcome>;

    /// Transform a whole dataset.
    ///
    /// The default maps [`Self::process_example`] over every record in order and removes
    /// dropped records.
    fn apply_to_dataset(&self, dataset: &DataSet) -> PipelineResult<DataSet> {
        crate::execution::map_filter(self, dataset)
    }
}
