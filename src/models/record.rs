// Canonical record model: the normalized row representation returned to all
// callers regardless of backend
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::FrameError;

/// A normalized column value. Integers widen to 64-bit, floats to 64-bit,
/// temporal values carry a timezone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl CanonicalValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CanonicalValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CanonicalValue::Float(v) => Some(*v),
            CanonicalValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CanonicalValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CanonicalValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CanonicalValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON representation of a single value
    pub fn to_json(&self) -> Value {
        match self {
            CanonicalValue::Null => Value::Null,
            CanonicalValue::Bool(v) => json!(v),
            CanonicalValue::Int(v) => json!(v),
            CanonicalValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CanonicalValue::Text(v) => json!(v),
            CanonicalValue::Bytes(v) => json!(v),
            CanonicalValue::Timestamp(v) => {
                json!(v.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
    }
}

/// An ordered column-name to value mapping, normalized across drivers.
///
/// The column header is shared across every record of one result, so column
/// ordering is stable for all rows of the same query.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    columns: Arc<Vec<String>>,
    values: Vec<CanonicalValue>,
}

impl CanonicalRecord {
    pub fn new(
        columns: Arc<Vec<String>>,
        values: Vec<CanonicalValue>,
    ) -> Result<Self, FrameError> {
        if columns.len() != values.len() {
            return Err(FrameError::Internal(format!(
                "record arity mismatch: {} columns, {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Column names in driver order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Shared column header, for building sibling records of the same result.
    pub fn columns_arc(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value by column name, first match wins.
    pub fn get(&self, column: &str) -> Option<&CanonicalValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Value by position.
    pub fn value_at(&self, idx: usize) -> Option<&CanonicalValue> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[CanonicalValue] {
        &self.values
    }

    /// Replace the value at a position, keeping the shared header. Used by
    /// processing hooks that rewrite single columns.
    pub fn with_value_at(mut self, idx: usize, value: CanonicalValue) -> Result<Self, FrameError> {
        if idx >= self.values.len() {
            return Err(FrameError::Internal(format!(
                "column index {} out of bounds for record of {} columns",
                idx,
                self.values.len()
            )));
        }
        self.values[idx] = value;
        Ok(self)
    }

    /// JSON object in driver column order.
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (name, value) in self.columns.iter().zip(&self.values) {
            obj.insert(name.clone(), value.to_json());
        }
        Value::Object(obj)
    }

    /// Map the record onto a user type through serde, the way the original
    /// mapped result rows onto persistence entities.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, FrameError> {
        serde_json::from_value(self.to_json())
            .map_err(|e| FrameError::Internal(format!("record mapping failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> Arc<Vec<String>> {
        Arc::new(vec!["id".to_string(), "name".to_string(), "score".to_string()])
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let result = CanonicalRecord::new(header(), vec![CanonicalValue::Int(1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup_by_name_and_position() {
        let record = CanonicalRecord::new(
            header(),
            vec![
                CanonicalValue::Int(7),
                CanonicalValue::Text("alice".to_string()),
                CanonicalValue::Float(0.5),
            ],
        )
        .unwrap();

        assert_eq!(record.get("id").and_then(|v| v.as_i64()), Some(7));
        assert_eq!(record.get("name").and_then(|v| v.as_str()), Some("alice"));
        assert_eq!(record.value_at(2).and_then(|v| v.as_f64()), Some(0.5));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_json_keeps_column_order() {
        let record = CanonicalRecord::new(
            header(),
            vec![
                CanonicalValue::Int(1),
                CanonicalValue::Text("bob".to_string()),
                CanonicalValue::Null,
            ],
        )
        .unwrap();

        let json = record.to_json();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["id", "name", "score"]);
        assert_eq!(json["score"], Value::Null);
    }

    #[test]
    fn test_timestamp_renders_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let value = CanonicalValue::Timestamp(ts);
        let rendered = value.to_json();
        assert!(rendered.as_str().unwrap().starts_with("2024-05-01T12:30:00"));
    }

    #[test]
    fn test_into_typed() {
        #[derive(Deserialize)]
        struct User {
            id: i64,
            name: String,
        }

        let record = CanonicalRecord::new(
            Arc::new(vec!["id".to_string(), "name".to_string()]),
            vec![
                CanonicalValue::Int(42),
                CanonicalValue::Text("carol".to_string()),
            ],
        )
        .unwrap();

        let user: User = record.into_typed().unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.name, "carol");
    }

    #[test]
    fn test_with_value_at() {
        let record = CanonicalRecord::new(
            Arc::new(vec!["a".to_string()]),
            vec![CanonicalValue::Int(1)],
        )
        .unwrap();

        let updated = record.with_value_at(0, CanonicalValue::Int(2)).unwrap();
        assert_eq!(updated.value_at(0).and_then(|v| v.as_i64()), Some(2));
        assert!(updated.with_value_at(5, CanonicalValue::Null).is_err());
    }
}
