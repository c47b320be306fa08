//! The universal value type.
//!
//! Every node input, output and configuration tree is a [`Value`]: a
//! recursive tagged union of null, booleans, integers, floats, strings,
//! sequences and string-keyed mappings. Template resolution and all config
//! traversal operate strictly on this shape; foreign values are coerced
//! through a JSON round-trip.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Workflow data value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key on a mapping. `None` for any other shape.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Render the value into its in-string textual form.
    ///
    /// Null renders empty, scalars use their default formatter, and
    /// structured values render as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Approximate byte size as the length of the JSON encoding.
    ///
    /// This is an accounting estimate, not a memory measurement.
    pub fn estimated_size(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }

    /// Convert into a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => {
                serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::List(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => Value::Map(
                obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        v.to_json()
    }
}

/// Build a [`Value::Map`] from key/value pairs.
///
/// # Example
///
/// ```rust
/// use weft_kernel::value::{map_value, Value};
///
/// let v = map_value([("name", Value::from("weft")), ("count", Value::from(2i64))]);
/// assert_eq!(v.get("name").and_then(|v| v.as_str()), Some("weft"));
/// ```
pub fn map_value<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let v: Value = 42i64.into();
        assert_eq!(v.as_i64(), Some(42));

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: Value = true.into();
        assert_eq!(v.as_bool(), Some(true));

        let v: Value = 3.25f64.into();
        assert_eq!(v.as_f64(), Some(3.25));
    }

    #[test]
    fn int_widens_to_f64() {
        let v: Value = 7i64.into();
        assert_eq!(v.as_f64(), Some(7.0));
    }

    #[test]
    fn render_scalars() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::Bool(false).render(), "false");
        assert_eq!(Value::Int(-3).render(), "-3");
        assert_eq!(Value::Float(1.5).render(), "1.5");
        assert_eq!(Value::from("abc").render(), "abc");
    }

    #[test]
    fn render_structured_is_compact_json() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(v.render(), "[1,2]");

        let v = map_value([("k", Value::from("v"))]);
        assert_eq!(v.render(), r#"{"k":"v"}"#);
    }

    #[test]
    fn json_round_trip() {
        let json = serde_json::json!({
            "name": "test",
            "values": [1, 2.5, null],
            "nested": { "flag": true }
        });
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn estimated_size_tracks_json_length() {
        let v = Value::from("abcd");
        // JSON encoding includes the quotes.
        assert_eq!(v.estimated_size(), 6);
    }

    #[test]
    fn untagged_serde() {
        let v: Value = serde_json::from_str(r#"{"a": [1, "x"], "b": 2.5}"#).unwrap();
        assert_eq!(v.get("b").and_then(|v| v.as_f64()), Some(2.5));
        let list = v.get("a").and_then(|v| v.as_list()).unwrap();
        assert_eq!(list[0].as_i64(), Some(1));
        assert_eq!(list[1].as_str(), Some("x"));
    }
}
