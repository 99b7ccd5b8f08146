//! Core data model types for preprocessing.
//!
//! A [`DataSet`] is an ordered list of [`Record`]s (field name to [`Value`] maps) plus a
//! [`Schema`] describing the semantic type of each field. A field that is not present in a
//! record is *absent*, which is distinct from an explicit [`Value::Null`].

use std::collections::BTreeMap;

use image::DynamicImage;

use crate::error::{PipelineError, PipelineResult};

/// One row of a dataset.
pub type Record = BTreeMap<String, Value>;

/// Logical data type for a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// No information yet (all values null) or mixed values; accepts anything.
    Unknown,
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// UTF-8 string.
    Utf8,
    /// Raw byte sequence.
    Binary,
    /// Canonical decoded-image type.
    Image,
    /// Ordered sequence of a single item type.
    List(Box<DataType>),
    /// Nested mapping with named, typed fields.
    Struct(Vec<Field>),
}

impl DataType {
    /// Infer the type of a single value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null => Self::Unknown,
            Value::Bool(_) => Self::Bool,
            Value::Int64(_) => Self::Int64,
            Value::Float64(_) => Self::Float64,
            Value::Utf8(_) => Self::Utf8,
            Value::Binary(_) => Self::Binary,
            Value::Image(_) => Self::Image,
            Value::List(items) => Self::List(Box::new(
                items
                    .iter()
                    .map(Self::infer)
                    .fold(Self::Unknown, Self::merge),
            )),
            Value::Struct(map) => Self::Struct(
                map.iter()
                    .map(|(name, v)| Field::new(name.clone(), Self::infer(v)))
                    .collect(),
            ),
        }
    }

    /// Combine two observed types for the same field.
    ///
    /// Integers widen to floats; conflicting types collapse to [`DataType::Unknown`].
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Unknown, t) | (t, Self::Unknown) => t,
            (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Self::Float64,
            (Self::List(a), Self::List(b)) => Self::List(Box::new(a.merge(*b))),
            (Self::Struct(a), Self::Struct(b)) => {
                let mut fields: BTreeMap<String, DataType> = BTreeMap::new();
                for f in a.into_iter().chain(b) {
                    let merged = match fields.remove(&f.name) {
                        Some(existing) => existing.merge(f.data_type),
                        None => f.data_type,
                    };
                    fields.insert(f.name, merged);
                }
                Self::Struct(
                    fields
                        .into_iter()
                        .map(|(name, t)| Field::new(name, t))
                        .collect(),
                )
            }
            _ => Self::Unknown,
        }
    }

    /// Returns `true` if `value` conforms to this type. `Null` conforms to every type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Unknown, _) => true,
            (Self::Bool, Value::Bool(_))
            | (Self::Int64, Value::Int64(_))
            | (Self::Float64, Value::Float64(_) | Value::Int64(_))
            | (Self::Utf8, Value::Utf8(_))
            | (Self::Binary, Value::Binary(_))
            | (Self::Image, Value::Image(_)) => true,
            (Self::List(item), Value::List(items)) => items.iter().all(|v| item.accepts(v)),
            (Self::Struct(fields), Value::Struct(map)) => map.iter().all(|(name, v)| {
                fields
                    .iter()
                    .find(|f| &f.name == name)
                    .is_some_and(|f| f.data_type.accepts(v))
            }),
            _ => false,
        }
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered list of fields describing the current shape of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Infer a schema from records. Field order follows name order.
    pub fn infer(records: &[Record]) -> Self {
        Self::default().derive(records)
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the field with the given name, if present.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns `true` if the schema has a field called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Returns the subset of `names` not present in the schema, preserving input order.
    pub fn missing<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| !self.contains(n))
            .map(str::to_string)
            .collect()
    }

    /// Returns a copy with `name` retyped to `data_type` (appended if not present).
    pub fn with_field_type(&self, name: &str, data_type: DataType) -> Self {
        let mut out = self.clone();
        match out.fields.iter_mut().find(|f| f.name == name) {
            Some(f) => f.data_type = data_type,
            None => out.fields.push(Field::new(name, data_type)),
        }
        out
    }

    /// Derive the schema of `records` produced from a dataset described by `self`.
    ///
    /// Fields keep their declared type while every value still conforms to it; otherwise the
    /// type is re-inferred. Fields no record carries are removed and new fields are appended
    /// in name order. With no records the current schema is kept as-is.
    pub fn derive(&self, records: &[Record]) -> Self {
        if records.is_empty() {
            return self.clone();
        }

        let mut inferred: BTreeMap<&str, DataType> = BTreeMap::new();
        for record in records {
            for (name, value) in record {
                let t = DataType::infer(value);
                let merged = match inferred.remove(name.as_str()) {
                    Some(existing) => existing.merge(t),
                    None => t,
                };
                inferred.insert(name.as_str(), merged);
            }
        }

        let mut fields = Vec::with_capacity(inferred.len());
        for declared in &self.fields {
            let Some(observed) = inferred.remove(declared.name.as_str()) else {
                continue;
            };
            let keeps_declared = declared.data_type != DataType::Unknown
                && records
                    .iter()
                    .filter_map(|r| r.get(&declared.name))
                    .all(|v| declared.data_type.accepts(v));
            let data_type = if keeps_declared {
                declared.data_type.clone()
            } else {
                observed
            };
            fields.push(Field::new(declared.name.clone(), data_type));
        }
        fields.extend(
            inferred
                .into_iter()
                .map(|(name, data_type)| Field::new(name, data_type)),
        );

        Self { fields }
    }
}

/// A single value in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// In-memory decoded image.
    Image(DynamicImage),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Nested mapping.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string slice for [`Value::Utf8`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested map for [`Value::Struct`].
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Utf8(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Utf8(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl From<DynamicImage> for Value {
    fn from(img: DynamicImage) -> Self {
        Self::Image(img)
    }
}

/// In-memory record dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    /// Schema describing the current record shape.
    pub schema: Schema,
    /// Records in dataset order.
    pub records: Vec<Record>,
}

impl DataSet {
    /// Create a dataset from schema and records.
    pub fn new(schema: Schema, records: Vec<Record>) -> Self {
        Self { schema, records }
    }

    /// Create a dataset whose schema is inferred from `records`.
    pub fn from_records(records: Vec<Record>) -> Self {
        let schema = Schema::infer(&records);
        Self { schema, records }
    }

    /// Number of records in the dataset.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Create a new dataset by applying `mapper` to every record and removing `None` results.
    ///
    /// Record order is preserved; the schema is re-derived from the output (see
    /// [`Schema::derive`]). The first error aborts the whole map.
    pub fn try_filter_map<E, F>(&self, mut mapper: F) -> Result<Self, E>
    where
        F: FnMut(&Record) -> Result<Option<Record>, E>,
    {
        let mut records = Vec::with_capacity(self.records.len());
        for record in &self.records {
            if let Some(out) = mapper(record)? {
                records.push(out);
            }
        }
        Ok(self.with_records(records))
    }

    /// Create a new dataset from `records` produced from this one, re-deriving the schema.
    pub fn with_records(&self, records: Vec<Record>) -> Self {
        let schema = self.schema.derive(&records);
        Self { schema, records }
    }

    /// Create a new dataset with the listed fields retyped.
    ///
    /// Every present value of a retyped field must conform to the new type; otherwise this
    /// fails with [`PipelineError::SchemaMismatch`] and no dataset is produced.
    pub fn cast(&self, fields: &[(&str, DataType)]) -> PipelineResult<Self> {
        let mut schema = self.schema.clone();
        for (name, data_type) in fields {
            if let Some(pos) = self
                .records
                .iter()
                .position(|r| r.get(*name).is_some_and(|v| !data_type.accepts(v)))
            {
                return Err(PipelineError::SchemaMismatch {
                    message: format!(
                        "cannot cast field '{name}' to {data_type:?}: record {pos} holds {:?}",
                        self.records[pos].get(*name).map(DataType::infer)
                    ),
                });
            }
            schema = schema.with_field_type(name, data_type.clone());
        }
        Ok(Self {
            schema,
            records: self.records.clone(),
        })
    }
}
