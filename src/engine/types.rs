// SPDX-License-Identifier: Apache-2.0

//! Portable data types for the multi-datasource engine
//!
//! These types decouple the engine from the TDS driver: column metadata is
//! reduced to a [`PortableType`], cell values to a [`Value`], and a result set
//! serializes to the `{"columns": [...], "rows": [{...}]}` shape the host
//! expects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::engine::error::EngineResult;

/// Soft error reported when a statement produced no result set.
pub const NO_DATA_MESSAGE: &str = "No data was returned.";

/// Soft error reported when the host cancelled a running query.
pub const CANCELLED_MESSAGE: &str = "Query cancelled by user.";

/// The engine's own column type, independent of driver type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortableType {
    String,
    Boolean,
    Float,
    DateTime,
    Unknown,
}

impl PortableType {
    /// Wire name of the type. `Unknown` has none and serializes as `null`.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            PortableType::String => Some("string"),
            PortableType::Boolean => Some("boolean"),
            PortableType::Float => Some("float"),
            PortableType::DateTime => Some("datetime"),
            PortableType::Unknown => None,
        }
    }
}

impl Serialize for PortableType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.as_str() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_none(),
        }
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub portable_type: PortableType,
}

impl Serialize for ColumnDescriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ColumnDescriptor", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("friendly_name", &self.name)?;
        state.serialize_field("type", &self.portable_type)?;
        state.end()
    }
}

/// Builds column descriptors from raw `(name, type)` pairs.
///
/// Repeated names get a running counter appended (`id`, `id1`, `id2`), so the
/// names of one result are always unique.
pub fn build_columns<I>(raw: I) -> Vec<ColumnDescriptor>
where
    I: IntoIterator<Item = (String, PortableType)>,
{
    let mut seen: Vec<String> = Vec::new();
    let mut duplicates = 1;
    let mut columns = Vec::new();

    for (name, portable_type) in raw {
        let name = if seen.contains(&name) {
            let renamed = format!("{}{}", name, duplicates);
            duplicates += 1;
            renamed
        } else {
            name
        };
        seen.push(name.clone());
        columns.push(ColumnDescriptor {
            name,
            portable_type,
        });
    }

    columns
}

/// Universal cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Bytes(Vec<u8>),
}

impl Value {
    /// Text form of the value, `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Uuid(u) => Some(u.to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::DateTimeOffset(dt) => Some(dt.to_rfc3339()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            Value::Bytes(b) => Some(hex::encode(b)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Uuid(u) => serializer.collect_str(&u.hyphenated()),
            other => match other.to_text() {
                Some(text) => serializer.serialize_str(&text),
                None => serializer.serialize_none(),
            },
        }
    }
}

/// Column names of one executed query plus a name → position index.
///
/// Shared by every row of that query.
#[derive(Debug, PartialEq, Eq)]
pub struct RowLayout {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl RowLayout {
    pub fn new(columns: &[ColumnDescriptor]) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A single row, positional, keyed through its originating [`RowLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    layout: Arc<RowLayout>,
    values: Vec<Value>,
}

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        self.layout.names()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layout.position(name).and_then(|i| self.values.get(i))
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.layout.names().iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Query execution result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Builds a result from column metadata and positional records.
    ///
    /// Records are padded with NULL or truncated so every row is exactly as
    /// wide as `columns`.
    pub fn from_records(columns: Vec<ColumnDescriptor>, records: Vec<Vec<Value>>) -> Self {
        let layout = Arc::new(RowLayout::new(&columns));
        let width = layout.len();
        let rows = records
            .into_iter()
            .map(|mut values| {
                values.resize(width, Value::Null);
                Row {
                    layout: Arc::clone(&layout),
                    values,
                }
            })
            .collect();
        Self { columns, rows }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What one target execution produced when it did not fail fatally.
///
/// Exactly one of `result` and `error` is set by the executor; the aggregator
/// combines several outcomes into one.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub result: Option<QueryResult>,
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn success(result: QueryResult) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn soft_error(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
        }
    }

    pub fn no_data() -> Self {
        Self::soft_error(NO_DATA_MESSAGE)
    }

    pub fn cancelled() -> Self {
        Self::soft_error(CANCELLED_MESSAGE)
    }

    /// Converts a soft error into `Err(message)`.
    pub fn into_result(self) -> Result<QueryResult, String> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(NO_DATA_MESSAGE.to_string()),
        }
    }
}

/// A table and its columns, as shown in the host's schema browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchemaEntry {
    /// `table` when owned by the default database's namespace, else `namespace.table`
    pub name: String,
    pub columns: Vec<String>,
}
