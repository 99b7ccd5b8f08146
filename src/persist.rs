//! Dataset sink: write prepared records as NDJSON.
//!
//! Binary values are written as base64 text and decoded images as `{"bytes": <base64 PNG>}`,
//! so the output can be read back by [`crate::ingestion`] and normalized again by the image
//! converter.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{PipelineError, PipelineResult};
use crate::processing::image_format::encode_png;
use crate::types::{DataSet, Record, Value};

/// Write every record of `dataset` as one JSON object per line, creating parent directories.
///
/// Returns the number of records written.
pub fn write_ndjson(dataset: &DataSet, path: impl AsRef<Path>) -> PipelineResult<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(path)?);
    for record in dataset.records() {
        serde_json::to_writer(&mut out, &record_to_json(record)?)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(dataset.len())
}

/// Convert a record into a JSON object.
pub fn record_to_json(record: &Record) -> PipelineResult<JsonValue> {
    let mut obj = JsonMap::with_capacity(record.len());
    for (name, value) in record {
        obj.insert(name.clone(), value_to_json(name, value)?);
    }
    Ok(JsonValue::Object(obj))
}

fn value_to_json(field: &str, value: &Value) -> PipelineResult<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int64(v) => JsonValue::from(*v),
        Value::Float64(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Utf8(s) => JsonValue::String(s.clone()),
        Value::Binary(bytes) => JsonValue::String(BASE64_STANDARD.encode(bytes)),
        Value::Image(img) => {
            let png = encode_png(img).map_err(|source| PipelineError::ImageConversion {
                field: field.to_string(),
                source,
            })?;
            let mut obj = JsonMap::new();
            obj.insert(
                "bytes".to_string(),
                JsonValue::String(BASE64_STANDARD.encode(png)),
            );
            JsonValue::Object(obj)
        }
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|v| value_to_json(field, v))
                .collect::<PipelineResult<Vec<_>>>()?,
        ),
        Value::Struct(map) => {
            let mut obj = JsonMap::with_capacity(map.len());
            for (name, v) in map {
                obj.insert(name.clone(), value_to_json(field, v)?);
            }
            JsonValue::Object(obj)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::record_to_json;
    use crate::types::{Record, Value};

    #[test]
    fn binary_is_base64_and_nan_is_null() {
        let mut r = Record::new();
        r.insert("b".to_string(), Value::Binary(b"hi".to_vec()));
        r.insert("f".to_string(), Value::Float64(f64::NAN));
        r.insert("l".to_string(), Value::List(vec![Value::Int64(1), Value::Null]));

        let json = record_to_json(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"b": "aGk=", "f": null, "l": [1, null]})
        );
    }
}
