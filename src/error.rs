use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by registry lookups, processor construction, and pipeline runs.
///
/// Construction and schema errors are always fatal to a run. Per-record failures only surface
/// here when the processor that hit them is configured to propagate instead of skip.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The worker pool for sharded mapping could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// No constructor is registered under `name`.
    #[error("unknown processor '{name}'")]
    UnknownProcessor { name: String },

    /// A constructor is already registered under `name`.
    #[error("processor '{name}' is already registered")]
    DuplicateProcessor { name: String },

    /// The pipeline configuration itself is unusable (missing source, unknown file format).
    #[error("invalid pipeline config: {message}")]
    PipelineConfig { message: String },

    /// A processor rejected its configuration.
    #[error("invalid config for processor '{processor}': {message}")]
    Config { processor: String, message: String },

    /// The runtime lacks an ability the processor depends on.
    #[error("processor '{processor}' requires unavailable capability: {capability}")]
    CapabilityUnavailable {
        processor: String,
        capability: String,
    },

    /// Required columns are absent from the dataset schema.
    #[error("processor '{processor}' is missing required column(s): {}", columns.join(", "))]
    MissingColumn {
        processor: String,
        columns: Vec<String>,
    },

    /// The data does not conform to a schema (cast failure, malformed input rows, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// An image field could not be converted to the requested representation.
    #[error("failed to convert image field '{field}': {source}")]
    ImageConversion {
        field: String,
        #[source]
        source: ConversionError,
    },

    /// A stage failed while being applied; wraps the underlying cause.
    #[error("stage {index} ('{processor}') failed: {source}")]
    StageFailed {
        processor: String,
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub(crate) fn config(processor: &str, message: impl Into<String>) -> Self {
        Self::Config {
            processor: processor.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of a single failed image decode/encode attempt.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The bytes could not be decoded as an image.
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),

    /// The image could not be encoded to the canonical format.
    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),

    /// The referenced file could not be opened or decoded.
    #[error("failed to load image from {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
