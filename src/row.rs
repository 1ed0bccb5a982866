// Copyright 2024 The BigQuery Ingester Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Row and value types for streaming inserts
//!
//! A [`Row`] is an ordered mapping from field name to [`Value`]. The inserter
//! does not interpret rows beyond serializing them through a [`RowEncoder`];
//! the default [`JsonRowEncoder`] produces the JSON object the streaming
//! insert endpoint expects, with bytes fields base64-encoded.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use snafu::{OptionExt, ResultExt};

use crate::error::{self, Result};

/// An ordered record of named values, as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    /// Create a new empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new row with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a field value. Replaces the value in place when the field already
    /// exists, so field order is the order of first insertion.
    pub fn set<N: Into<String>, V: Into<Value>>(mut self, name: N, value: V) -> Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Number of fields in the row
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |row, (n, v)| row.set(n, v))
    }
}

/// Tagged value union covering the streaming-insert type mappings
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Raw bytes; base64-encoded on the wire
    Bytes(Vec<u8>),
    /// Repeated field
    List(Vec<Value>),
    /// Nested record
    Record(Row),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Integer(v.into())
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Integer(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Row> for Value {
    fn from(v: Row) -> Self {
        Value::Record(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Serializes rows into their wire representation.
///
/// The batch accumulator budgets bytes against the encoder's output, so an
/// encoder must be deterministic: encoding the same row twice yields the
/// same string.
pub trait RowEncoder: Send + Sync {
    fn encode(&self, row: &Row) -> Result<String>;
}

/// The default encoder, producing one JSON object per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowEncoder;

impl RowEncoder for JsonRowEncoder {
    fn encode(&self, row: &Row) -> Result<String> {
        let value = row_to_json(row)?;
        serde_json::to_string(&value).context(error::SerializeRowSnafu)
    }
}

fn row_to_json(row: &Row) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::with_capacity(row.len());
    for (name, value) in row.fields() {
        map.insert(name.to_string(), value_to_json(name, value)?);
    }
    Ok(serde_json::Value::Object(map))
}

fn value_to_json(field: &str, value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(v) => (*v).into(),
        Value::Integer(v) => (*v).into(),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .context(error::NonFiniteFloatSnafu { field })?,
        Value::String(v) => v.clone().into(),
        Value::Bytes(v) => BASE64_STANDARD.encode(v).into(),
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| value_to_json(field, item))
                .collect::<Result<_>>()?,
        ),
        Value::Record(row) => row_to_json(row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn encode(row: &Row) -> String {
        JsonRowEncoder.encode(row).unwrap()
    }

    #[test]
    fn test_encode_preserves_field_order() {
        let row = Row::new()
            .set("zebra", 1i64)
            .set("apple", 2i64)
            .set("mango", 3i64);

        assert_eq!(encode(&row), r#"{"zebra":1,"apple":2,"mango":3}"#);
    }

    #[test]
    fn test_encode_scalar_types() {
        let row = Row::new()
            .set("name", "Alice")
            .set("age", 21i64)
            .set("score", 7.5f64)
            .set("active", true)
            .set("note", Value::Null);

        assert_eq!(
            encode(&row),
            r#"{"name":"Alice","age":21,"score":7.5,"active":true,"note":null}"#
        );
    }

    #[test]
    fn test_encode_bytes_as_base64() {
        let row = Row::new().set("blob", b"hello".to_vec());
        assert_eq!(encode(&row), r#"{"blob":"aGVsbG8="}"#);
    }

    #[test]
    fn test_encode_nested_list_and_record() {
        let nested = Row::new().set("city", "Berlin");
        let row = Row::new()
            .set("tags", vec![Value::from("a"), Value::from("b")])
            .set("address", nested);

        assert_eq!(
            encode(&row),
            r#"{"tags":["a","b"],"address":{"city":"Berlin"}}"#
        );
    }

    #[test]
    fn test_encode_rejects_non_finite_float() {
        let row = Row::new().set("bad", f64::NAN);
        let err = JsonRowEncoder.encode(&row).unwrap_err();
        assert!(matches!(err, Error::NonFiniteFloat { ref field, .. } if field == "bad"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let row = Row::new().set("a", 1i64).set("b", 2i64).set("a", 3i64);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("a"), Some(&Value::Integer(3)));
        assert_eq!(encode(&row), r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn test_from_iterator() {
        let row: Row = [("x", 1i64), ("y", 2i64)].into_iter().collect();
        assert_eq!(row.get("y"), Some(&Value::Integer(2)));
    }
}
