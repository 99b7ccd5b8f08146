//! JSON ingestion implementation.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single JSON object
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Every top-level object becomes one [`Record`]; nested objects become [`Value::Struct`] and
//! arrays become [`Value::List`]. The schema is inferred from the records.

use std::fs;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Record, Value};

/// Ingest a JSON or NDJSON file into an in-memory [`DataSet`].
pub fn ingest_json_from_path(path: impl AsRef<Path>) -> PipelineResult<DataSet> {
    let text = fs::read_to_string(path)?;
    ingest_json_from_str(&text)
}

/// Ingest JSON from an in-memory string into a [`DataSet`].
///
/// Blank input is rejected: with no records there is no schema to check required columns
/// against.
pub fn ingest_json_from_str(input: &str) -> PipelineResult<DataSet> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::SchemaMismatch {
            message: "json input is empty".to_string(),
        });
    }

    // First try parsing as a single JSON value (array or object).
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match v {
            serde_json::Value::Array(items) => records_from_values(items),
            serde_json::Value::Object(_) => records_from_values(vec![v]),
            _ => Err(PipelineError::SchemaMismatch {
                message: "json must be an object, an array of objects, or NDJSON".to_string(),
            }),
        }
    } else {
        // Fall back to NDJSON.
        let mut values = Vec::new();
        for (i, line) in trimmed.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                PipelineError::SchemaMismatch {
                    message: format!("invalid ndjson at line {}: {}", i + 1, e),
                }
            })?;
            values.push(v);
        }
        records_from_values(values)
    }
}

fn records_from_values(values: Vec<serde_json::Value>) -> PipelineResult<DataSet> {
    let mut records: Vec<Record> = Vec::with_capacity(values.len());
    for (idx0, v) in values.into_iter().enumerate() {
        match v {
            serde_json::Value::Object(obj) => records.push(
                obj.into_iter()
                    .map(|(k, v)| (k, value_from_json(v)))
                    .collect(),
            ),
            _ => {
                return Err(PipelineError::SchemaMismatch {
                    message: format!("row {} is not a json object", idx0 + 1),
                });
            }
        }
    }
    Ok(DataSet::from_records(records))
}

/// Convert a JSON value into a record [`Value`].
pub fn value_from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::Utf8(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(obj) => Value::Struct(
            obj.into_iter()
                .map(|(k, v)| (k, value_from_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::ingest_json_from_str;
    use crate::types::{DataType, Value};

    #[test]
    fn nested_objects_and_arrays_map_to_struct_and_list() {
        let ds = ingest_json_from_str(
            r#"[{"id":1,"qa_pairs":{"question":["q"],"answer":"a"},"score":0.5}]"#,
        )
        .unwrap();
        assert_eq!(ds.len(), 1);

        let qa = ds.records[0].get("qa_pairs").and_then(Value::as_struct).unwrap();
        assert_eq!(qa.get("question"), Some(&Value::List(vec![Value::from("q")])));
        assert_eq!(ds.schema.field("score").unwrap().data_type, DataType::Float64);
    }

    #[test]
    fn large_unsigned_numbers_become_floats() {
        let ds = ingest_json_from_str(r#"{"n":18446744073709551615}"#).unwrap();
        assert!(matches!(ds.records[0].get("n"), Some(Value::Float64(_))));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = ingest_json_from_str("  \n").unwrap_err();
        assert!(err.to_string().contains("json input is empty"));
    }
}
