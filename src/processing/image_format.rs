//! Normalize image columns to a single representation.
//!
//! Image fields arrive in many shapes: decoded images, `{bytes, path}` structs (with raw or
//! base64 bytes), bare bytes, or bare base64 text. Every value is first classified into an
//! [`ImageValue`] and then converted to the configured [`TargetFormat`]:
//!
//! - [`TargetFormat::Decoded`]: an in-memory [`DynamicImage`]; at dataset level the column is
//!   then retyped to [`DataType::Image`].
//! - [`TargetFormat::Encoded`]: canonical bytes (PNG for decoded images).
//!
//! Conversion failures are logged and the field is left as-is when `skip_on_error` is set
//! (the default); otherwise they abort the run. Bare base64 text is always best-effort: a
//! failed decode only logs a warning, whatever `skip_on_error` says.

use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

use crate::config::ProcessorConfig;
use crate::error::{ConversionError, PipelineError, PipelineResult};
use crate::types::{DataSet, DataType, Record, Value};

use super::{Outcome, Processor};

/// Registry name.
pub const NAME: &str = "image_format_converter";

/// Representation image fields are converted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TargetFormat {
    /// Decoded in-memory image.
    #[default]
    #[serde(rename = "hf_image", alias = "decoded")]
    Decoded,
    /// Canonical encoded bytes.
    #[serde(rename = "bytes", alias = "encoded")]
    Encoded,
}

/// Options for [`ImageFormatConverter`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageFormatOptions {
    pub image_fields: Vec<String>,
    pub target_format: TargetFormat,
    /// Log and leave the field unchanged on conversion failure instead of failing the run.
    pub skip_on_error: bool,
}

impl Default for ImageFormatOptions {
    fn default() -> Self {
        Self {
            image_fields: vec!["image".to_string()],
            target_format: TargetFormat::default(),
            skip_on_error: true,
        }
    }
}

/// An image field value, classified by shape.
#[derive(Debug, Clone, Copy)]
pub enum ImageValue<'a> {
    Decoded(&'a DynamicImage),
    /// Raw bytes, either bare or embedded in a `{bytes: ...}` struct.
    EncodedBytes { bytes: &'a [u8], embedded: bool },
    /// Base64 text, either bare or embedded in a `{bytes: ...}` struct.
    EncodedBase64 { payload: &'a str, embedded: bool },
    /// `{path: ...}` struct without bytes.
    PathRef(&'a str),
    Empty,
    Unrecognized(&'static str),
}

impl<'a> ImageValue<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Image(img) => Self::Decoded(img),
            Value::Binary(bytes) => Self::EncodedBytes {
                bytes,
                embedded: false,
            },
            Value::Utf8(text) => Self::EncodedBase64 {
                payload: text,
                embedded: false,
            },
            Value::Struct(map) => match (map.get("bytes"), map.get("path")) {
                (Some(Value::Binary(bytes)), _) => Self::EncodedBytes {
                    bytes,
                    embedded: true,
                },
                (Some(Value::Utf8(payload)), _) => Self::EncodedBase64 {
                    payload,
                    embedded: true,
                },
                (None | Some(Value::Null), Some(Value::Utf8(path))) if !path.is_empty() => {
                    Self::PathRef(path)
                }
                _ => Self::Unrecognized("struct without bytes or path"),
            },
            Value::Bool(_) => Self::Unrecognized("bool"),
            Value::Int64(_) | Value::Float64(_) => Self::Unrecognized("number"),
            Value::List(_) => Self::Unrecognized("list"),
        }
    }
}

/// Result of one conversion attempt.
#[derive(Debug)]
enum Attempt {
    Converted(Value),
    Unchanged,
    Unrecognized(&'static str),
    /// Failure governed by `skip_on_error`.
    Failed(ConversionError),
    /// Failure that always falls back to leaving the field unchanged.
    Lenient(ConversionError),
}

impl Attempt {
    fn strict(result: Result<Value, ConversionError>) -> Self {
        result.map_or_else(Self::Failed, Self::Converted)
    }

    fn lenient(result: Result<Value, ConversionError>) -> Self {
        result.map_or_else(Self::Lenient, Self::Converted)
    }
}

/// Converts configured image fields to the target representation.
#[derive(Debug, Clone)]
pub struct ImageFormatConverter {
    opts: ImageFormatOptions,
}

/// Registry constructor.
pub fn create(config: &ProcessorConfig) -> PipelineResult<Box<dyn Processor>> {
    Ok(Box::new(ImageFormatConverter::from_config(config)?))
}

impl ImageFormatConverter {
    /// Validate options and runtime codec support.
    pub fn new(opts: ImageFormatOptions) -> PipelineResult<Self> {
        if opts.image_fields.is_empty() {
            return Err(PipelineError::config(NAME, "image_fields must not be empty"));
        }
        if let Some(blank) = opts.image_fields.iter().find(|f| f.trim().is_empty()) {
            return Err(PipelineError::config(
                NAME,
                format!("invalid image field name '{blank}'"),
            ));
        }
        check_codec_support()?;

        tracing::info!(
            fields = ?opts.image_fields,
            target = ?opts.target_format,
            "initialized image format converter"
        );
        Ok(Self { opts })
    }

    pub fn from_config(config: &ProcessorConfig) -> PipelineResult<Self> {
        Self::new(config.parse(NAME)?)
    }

    pub fn options(&self) -> &ImageFormatOptions {
        &self.opts
    }

    fn convert_field(&self, record: &mut Record, field: &str) -> PipelineResult<()> {
        let Some(value) = record.get(field) else {
            return Ok(());
        };
        let image = ImageValue::classify(value);
        let attempt = match self.opts.target_format {
            TargetFormat::Decoded => to_decoded(image),
            TargetFormat::Encoded => to_encoded(image),
        };

        match attempt {
            Attempt::Converted(v) => {
                record.insert(field.to_string(), v);
            }
            Attempt::Unchanged => {}
            Attempt::Unrecognized(kind) => {
                tracing::warn!(field, kind, "image value not recognized, leaving field unchanged");
            }
            Attempt::Lenient(err) => {
                tracing::warn!(field, %err, "failed to decode base64 string, leaving field unchanged");
            }
            Attempt::Failed(err) if self.opts.skip_on_error => {
                tracing::warn!(field, %err, "error converting image, leaving field unchanged");
            }
            Attempt::Failed(source) => {
                return Err(PipelineError::ImageConversion {
                    field: field.to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    fn decode_column(&self, dataset: &DataSet, field: &str) -> PipelineResult<DataSet> {
        tracing::info!(field, "converting field to decoded image type");
        let mapped = dataset.try_filter_map(|record| {
            let mut out = record.clone();
            self.convert_field(&mut out, field)?;
            Ok::<_, PipelineError>(Some(out))
        })?;

        match mapped.cast(&[(field, DataType::Image)]) {
            Ok(cast) => {
                tracing::info!(field, "converted field to image type");
                Ok(cast)
            }
            Err(err) if self.opts.skip_on_error => {
                tracing::error!(field, %err, "failed to retype field to image type");
                Ok(mapped)
            }
            Err(err) => Err(err),
        }
    }
}

impl Processor for ImageFormatConverter {
    fn name(&self) -> &str {
        NAME
    }

    fn required_columns(&self) -> Vec<String> {
        self.opts.image_fields.clone()
    }

    fn process_example(&self, record: &Record) -> PipelineResult<Outcome> {
        let mut out = record.clone();
        for field in &self.opts.image_fields {
            self.convert_field(&mut out, field)?;
        }
        Ok(Outcome::Keep(out))
    }

    fn apply_to_dataset(&self, dataset: &DataSet) -> PipelineResult<DataSet> {
        let initial = dataset.len();
        tracing::info!(
            records = initial,
            fields = ?self.opts.image_fields,
            target = ?self.opts.target_format,
            "image format converter: processing"
        );
        for field in &self.opts.image_fields {
            if let Some(f) = dataset.schema.field(field) {
                tracing::debug!(field, current = ?f.data_type, "current field type");
            }
        }

        let out = match self.opts.target_format {
            TargetFormat::Decoded => {
                let mut current = dataset.clone();
                for field in &self.opts.image_fields {
                    if !current.schema.contains(field) {
                        tracing::warn!(field, "field not found in dataset columns");
                        continue;
                    }
                    current = self.decode_column(&current, field)?;
                }
                current
            }
            TargetFormat::Encoded => dataset.try_filter_map(|record| {
                self.process_example(record).map(Outcome::into_option)
            })?,
        };

        tracing::info!(
            processed = out.len(),
            records = initial,
            "image format converter complete"
        );
        Ok(out)
    }
}

fn to_decoded(image: ImageValue<'_>) -> Attempt {
    match image {
        ImageValue::Empty | ImageValue::Decoded(_) => Attempt::Unchanged,
        ImageValue::EncodedBytes { bytes, .. } => Attempt::strict(decode_bytes(bytes)),
        ImageValue::EncodedBase64 { payload, embedded } => {
            let result = decode_base64(payload).and_then(|bytes| decode_bytes(&bytes));
            if embedded {
                Attempt::strict(result)
            } else {
                Attempt::lenient(result)
            }
        }
        ImageValue::PathRef(path) => Attempt::strict(
            image::open(path)
                .map(Value::Image)
                .map_err(|source| ConversionError::Path {
                    path: PathBuf::from(path),
                    source,
                }),
        ),
        ImageValue::Unrecognized(kind) => Attempt::Unrecognized(kind),
    }
}

fn to_encoded(image: ImageValue<'_>) -> Attempt {
    match image {
        ImageValue::Decoded(img) => Attempt::strict(encode_png(img).map(Value::Binary)),
        ImageValue::EncodedBytes {
            bytes,
            embedded: true,
        } => Attempt::Converted(Value::Binary(bytes.to_vec())),
        ImageValue::EncodedBytes {
            embedded: false, ..
        } => Attempt::Unchanged,
        ImageValue::EncodedBase64 { payload, embedded } => {
            let result = decode_base64(payload).map(Value::Binary);
            if embedded {
                Attempt::strict(result)
            } else {
                Attempt::lenient(result)
            }
        }
        ImageValue::PathRef(path) => {
            tracing::debug!(path, "path-only image left as reference");
            Attempt::Unchanged
        }
        ImageValue::Empty => Attempt::Unchanged,
        ImageValue::Unrecognized(kind) => Attempt::Unrecognized(kind),
    }
}

fn check_codec_support() -> PipelineResult<()> {
    let png = ImageFormat::Png;
    for (enabled, capability) in [
        (png.reading_enabled(), "png decoding"),
        (png.writing_enabled(), "png encoding"),
    ] {
        if !enabled {
            return Err(PipelineError::CapabilityUnavailable {
                processor: NAME.to_string(),
                capability: capability.to_string(),
            });
        }
    }
    Ok(())
}

/// Line breaks and other ASCII whitespace anywhere in the payload are ignored, so MIME-wrapped
/// base64 decodes too.
fn decode_base64(payload: &str) -> Result<Vec<u8>, ConversionError> {
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(BASE64_STANDARD.decode(compact)?)
}

fn decode_bytes(bytes: &[u8]) -> Result<Value, ConversionError> {
    image::load_from_memory(bytes)
        .map(Value::Image)
        .map_err(ConversionError::Decode)
}

/// Encode an image with the canonical lossless codec (PNG).
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ConversionError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(ConversionError::Encode)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use image::{DynamicImage, Rgb, RgbImage};

    use super::{encode_png, ImageFormatConverter, ImageFormatOptions, ImageValue, TargetFormat};
    use crate::config::ProcessorConfig;
    use crate::error::{ConversionError, PipelineError};
    use crate::processing::{Outcome, Processor};
    use crate::types::{DataSet, DataType, Record, Value};

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(4, 3, |x, y| {
            Rgb([(x * 40) as u8, (y * 60) as u8, 7])
        }))
    }

    fn bytes_struct(bytes: Value) -> Value {
        let mut m = BTreeMap::new();
        m.insert("bytes".to_string(), bytes);
        m.insert("path".to_string(), Value::Null);
        Value::Struct(m)
    }

    fn record_with(value: Value) -> Record {
        let mut r = Record::new();
        r.insert("image".to_string(), value);
        r
    }

    fn converter(target: TargetFormat, skip_on_error: bool) -> ImageFormatConverter {
        ImageFormatConverter::new(ImageFormatOptions {
            target_format: target,
            skip_on_error,
            ..Default::default()
        })
        .unwrap()
    }

    fn image_field(outcome: Outcome) -> Value {
        match outcome {
            Outcome::Keep(mut r) => r.remove("image").unwrap(),
            Outcome::Drop => panic!("image converter never drops"),
        }
    }

    #[test]
    fn classifies_every_shape() {
        let img = Value::Image(sample_image());
        assert!(matches!(ImageValue::classify(&img), ImageValue::Decoded(_)));
        assert!(matches!(ImageValue::classify(&Value::Null), ImageValue::Empty));
        assert!(matches!(
            ImageValue::classify(&Value::Binary(vec![1])),
            ImageValue::EncodedBytes { embedded: false, .. }
        ));
        assert!(matches!(
            ImageValue::classify(&bytes_struct(Value::from("aGk="))),
            ImageValue::EncodedBase64 { embedded: true, .. }
        ));

        let mut m = BTreeMap::new();
        m.insert("bytes".to_string(), Value::Null);
        m.insert("path".to_string(), Value::from("a.png"));
        assert!(matches!(
            ImageValue::classify(&Value::Struct(m)),
            ImageValue::PathRef("a.png")
        ));
        assert!(matches!(
            ImageValue::classify(&Value::Int64(3)),
            ImageValue::Unrecognized(_)
        ));
    }

    #[test]
    fn struct_with_base64_bytes_decodes_to_image() {
        let img = sample_image();
        let b64 = BASE64_STANDARD.encode(encode_png(&img).unwrap());
        let record = record_with(bytes_struct(Value::from(b64)));

        let out = converter(TargetFormat::Decoded, false)
            .process_example(&record)
            .unwrap();
        assert_eq!(image_field(out), Value::Image(img));
    }

    #[test]
    fn raw_bytes_and_path_decode_to_image() {
        let img = sample_image();
        let png = encode_png(&img).unwrap();
        let conv = converter(TargetFormat::Decoded, false);

        let out = conv.process_example(&record_with(Value::Binary(png.clone()))).unwrap();
        assert_eq!(image_field(out), Value::Image(img.clone()));

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("data-preproc-image-{nanos}.png"));
        std::fs::write(&path, &png).unwrap();
        let mut m = BTreeMap::new();
        m.insert("path".to_string(), Value::from(path.to_string_lossy().to_string()));
        let out = conv.process_example(&record_with(Value::Struct(m))).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(image_field(out), Value::Image(img));
    }

    #[test]
    fn corrupted_embedded_base64_raises_when_strict() {
        let record = record_with(bytes_struct(Value::from("@@not base64@@")));
        let err = converter(TargetFormat::Encoded, false)
            .process_example(&record)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ImageConversion {
                source: ConversionError::Base64(_),
                ..
            }
        ));
    }

    #[test]
    fn corrupted_embedded_base64_is_left_unchanged_when_skipping() {
        let original = bytes_struct(Value::from("@@not base64@@"));
        let out = converter(TargetFormat::Encoded, true)
            .process_example(&record_with(original.clone()))
            .unwrap();
        assert_eq!(image_field(out), original);
    }

    #[test]
    fn bare_base64_failure_is_lenient_even_when_strict() {
        let out = converter(TargetFormat::Decoded, false)
            .process_example(&record_with(Value::from("@@not base64@@")))
            .unwrap();
        assert_eq!(image_field(out), Value::from("@@not base64@@"));
    }

    #[test]
    fn undecodable_embedded_bytes_raise_when_strict() {
        let record = record_with(bytes_struct(Value::Binary(vec![0, 1, 2, 3])));
        let err = converter(TargetFormat::Decoded, false)
            .process_example(&record)
            .unwrap_err();
        assert!(err.to_string().contains("failed to convert image field 'image'"));
    }

    #[test]
    fn encode_then_decode_is_pixel_identical() {
        let img = sample_image();
        let encoded = image_field(
            converter(TargetFormat::Encoded, false)
                .process_example(&record_with(Value::Image(img.clone())))
                .unwrap(),
        );
        assert!(matches!(encoded, Value::Binary(_)));

        let decoded = image_field(
            converter(TargetFormat::Decoded, false)
                .process_example(&record_with(encoded))
                .unwrap(),
        );
        let Value::Image(round_tripped) = decoded else {
            panic!("expected decoded image");
        };
        assert_eq!(round_tripped.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn encoded_target_unwraps_struct_bytes_and_keeps_bare_bytes() {
        let conv = converter(TargetFormat::Encoded, false);
        let out = conv
            .process_example(&record_with(bytes_struct(Value::Binary(vec![9, 8]))))
            .unwrap();
        assert_eq!(image_field(out), Value::Binary(vec![9, 8]));

        let out = conv.process_example(&record_with(Value::Binary(vec![1]))).unwrap();
        assert_eq!(image_field(out), Value::Binary(vec![1]));

        let out = conv
            .process_example(&record_with(bytes_struct(Value::from("aGk="))))
            .unwrap();
        assert_eq!(image_field(out), Value::Binary(b"hi".to_vec()));
    }

    #[test]
    fn wrapped_base64_decodes_for_both_targets() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 40, |x, y| {
            Rgb([(x * 6) as u8, (y * 6) as u8, ((x + y) * 3) as u8])
        }));
        let png = encode_png(&img).unwrap();
        let b64 = BASE64_STANDARD.encode(&png);
        assert!(b64.len() > 76);
        let wrapped = b64
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");

        let record = record_with(bytes_struct(Value::from(wrapped.clone())));
        let decoded = converter(TargetFormat::Decoded, false)
            .process_example(&record)
            .unwrap();
        assert_eq!(image_field(decoded), Value::Image(img));

        let encoded = converter(TargetFormat::Encoded, false)
            .process_example(&record)
            .unwrap();
        assert_eq!(image_field(encoded), Value::Binary(png.clone()));

        let bare = converter(TargetFormat::Encoded, false)
            .process_example(&record_with(Value::from(format!("{wrapped}\n"))))
            .unwrap();
        assert_eq!(image_field(bare), Value::Binary(png));
    }

    #[test]
    fn encoded_target_decodes_bare_base64_text() {
        let out = converter(TargetFormat::Encoded, false)
            .process_example(&record_with(Value::from("aGk=")))
            .unwrap();
        assert_eq!(image_field(out), Value::Binary(b"hi".to_vec()));
    }

    #[test]
    fn encoded_target_leaves_bad_bare_base64_unchanged_even_when_strict() {
        let out = converter(TargetFormat::Encoded, false)
            .process_example(&record_with(Value::from("@@not base64@@")))
            .unwrap();
        assert_eq!(image_field(out), Value::from("@@not base64@@"));
    }

    #[test]
    fn dataset_decode_retypes_column_to_image() {
        let png = encode_png(&sample_image()).unwrap();
        let ds = DataSet::from_records(vec![
            record_with(bytes_struct(Value::Binary(png.clone()))),
            record_with(Value::Null),
            record_with(bytes_struct(Value::Binary(png))),
        ]);
        assert!(matches!(
            ds.schema.field("image").unwrap().data_type,
            DataType::Struct(_)
        ));

        let out = converter(TargetFormat::Decoded, false)
            .apply_to_dataset(&ds)
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.schema.field("image").unwrap().data_type, DataType::Image);
    }

    #[test]
    fn dataset_decode_keeps_uncast_column_when_skipping() {
        let ds = DataSet::from_records(vec![record_with(Value::Binary(vec![0, 0, 0]))]);

        let out = converter(TargetFormat::Decoded, true)
            .apply_to_dataset(&ds)
            .unwrap();
        assert_eq!(out.records, ds.records);
        assert_eq!(out.schema.field("image").unwrap().data_type, DataType::Binary);

        assert!(converter(TargetFormat::Decoded, false)
            .apply_to_dataset(&ds)
            .is_err());
    }

    #[test]
    fn parses_target_format_names_and_rejects_empty_fields() {
        let conv = ImageFormatConverter::from_config(
            &ProcessorConfig::new()
                .with("target_format", "bytes")
                .with("image_fields", serde_json::json!(["a", "b"])),
        )
        .unwrap();
        assert_eq!(conv.options().target_format, TargetFormat::Encoded);
        assert_eq!(conv.required_columns(), vec!["a", "b"]);

        let err = ImageFormatConverter::from_config(
            &ProcessorConfig::new().with("target_format", "jpeg"),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));

        let err = ImageFormatConverter::from_config(
            &ProcessorConfig::new().with("image_fields", serde_json::json!([])),
        )
        .unwrap_err();
        assert!(err.to_string().contains("image_fields must not be empty"));
    }
}
