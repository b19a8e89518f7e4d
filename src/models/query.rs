// Logical query model: backend-agnostic statement plus typed bound values
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed value bound to a `?` placeholder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ParamValue {
    Null,
    Bool(bool),
    /// All integers travel as 64-bit
    Int(i64),
    /// All floats travel as 64-bit
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Timezone-aware timestamp
    Timestamp(DateTime<Utc>),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(v: Vec<u8>) -> Self {
        ParamValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(v: DateTime<Utc>) -> Self {
        ParamValue::Timestamp(v)
    }
}

impl<T> From<Option<T>> for ParamValue
where
    T: Into<ParamValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => ParamValue::Null,
        }
    }
}

/// A backend-agnostic query: statement text with `?` placeholders, ordered
/// bound values and an optional target connector. One execution, immutable
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalQuery {
    pub id: String,
    pub statement: String,
    pub params: Vec<ParamValue>,
    /// Target connector name; falls back to the configured default when absent
    pub connector: Option<String>,
}

impl LogicalQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            statement: statement.into(),
            params: Vec::new(),
            connector: None,
        }
    }

    /// Bind the next positional value.
    pub fn bind(mut self, value: impl Into<ParamValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Bind a sequence of positional values.
    pub fn bind_all<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    /// Route the query to a named connector.
    pub fn on(mut self, connector: impl Into<String>) -> Self {
        self.connector = Some(connector.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_order_is_preserved() {
        let q = LogicalQuery::new("SELECT * FROM users WHERE age > ? AND name = ?")
            .bind(18)
            .bind("alice");

        assert_eq!(q.params.len(), 2);
        assert_eq!(q.params[0], ParamValue::Int(18));
        assert_eq!(q.params[1], ParamValue::Text("alice".to_string()));
    }

    #[test]
    fn test_option_binds_null() {
        let q = LogicalQuery::new("INSERT INTO t (a) VALUES (?)").bind(None::<i64>);
        assert_eq!(q.params[0], ParamValue::Null);
    }

    #[test]
    fn test_connector_routing() {
        let q = LogicalQuery::new("SELECT 1").on("primary");
        assert_eq!(q.connector.as_deref(), Some("primary"));

        let q = LogicalQuery::new("SELECT 1");
        assert!(q.connector.is_none());
    }

    #[test]
    fn test_queries_get_distinct_ids() {
        let a = LogicalQuery::new("SELECT 1");
        let b = LogicalQuery::new("SELECT 1");
        assert_ne!(a.id, b.id);
    }
}
