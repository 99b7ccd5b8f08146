//! Pipeline configuration.
//!
//! A [`PipelineConfig`] lists processors in the order they run. Each entry names a registered
//! processor under `type`; every other key is handed to that processor untouched as its
//! [`ProcessorConfig`]:
//!
//! ```yaml
//! dataset_prepared_path: data/prepared
//! processors:
//!   - type: longest_explanation_mapping
//!     qa_pairs_field: qa_pairs
//!     remove_source_fields: true
//!   - type: image_format_converter
//!     image_fields: [image]
//!     target_format: hf_image
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{PipelineError, PipelineResult};

/// Output location used when a config does not set `dataset_prepared_path`.
pub const DEFAULT_PREPARED_PATH: &str = "data/prepared";

/// Options for a single processor, owned and validated only by that processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorConfig(JsonMap<String, JsonValue>);

impl ProcessorConfig {
    /// Create an empty config (every option at its default).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly useful in tests and programmatic pipelines.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw option lookup.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Deserialize the options into a processor's typed option struct.
    ///
    /// Failures are reported as [`PipelineError::Config`] against `processor`.
    pub fn parse<T: DeserializeOwned>(&self, processor: &str) -> PipelineResult<T> {
        T::deserialize(JsonValue::Object(self.0.clone()))
            .map_err(|e| PipelineError::config(processor, e.to_string()))
    }
}

impl From<JsonMap<String, JsonValue>> for ProcessorConfig {
    fn from(map: JsonMap<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// One configured pipeline stage: the registered processor name plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    /// Registry name of the processor.
    #[serde(rename = "type")]
    pub name: String,
    /// Remaining keys of the entry.
    #[serde(flatten)]
    pub config: ProcessorConfig,
}

impl ProcessorSpec {
    /// Pair a processor name with its options.
    pub fn new(name: impl Into<String>, config: ProcessorConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Parse a config format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Top-level preprocessing configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source dataset location (JSON / NDJSON).
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
    /// Where the prepared dataset is persisted.
    #[serde(default)]
    pub dataset_prepared_path: Option<PathBuf>,
    /// Processors in execution order.
    #[serde(default)]
    pub processors: Vec<ProcessorSpec>,
}

impl PipelineConfig {
    /// Load a config file, choosing the parser from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|s| s.to_str())
            .and_then(ConfigFormat::from_extension)
            .ok_or_else(|| PipelineError::PipelineConfig {
                message: format!(
                    "cannot infer config format for path ({}); expected .json, .yaml or .yml",
                    path.display()
                ),
            })?;
        let text = fs::read_to_string(path)?;
        match format {
            ConfigFormat::Json => Self::from_json_str(&text),
            ConfigFormat::Yaml => Self::from_yaml_str(&text),
        }
    }

    /// Parse a JSON config.
    pub fn from_json_str(input: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse a YAML config.
    pub fn from_yaml_str(input: &str) -> PipelineResult<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// The prepared-output location, falling back to [`DEFAULT_PREPARED_PATH`].
    pub fn prepared_path(&self) -> PathBuf {
        match &self.dataset_prepared_path {
            Some(p) => p.clone(),
            None => {
                tracing::warn!(
                    default = DEFAULT_PREPARED_PATH,
                    "dataset_prepared_path not set, using default"
                );
                PathBuf::from(DEFAULT_PREPARED_PATH)
            }
        }
    }
}
