//! Opaque backend records.
//!
//! Backend payloads are carried through untouched. Only the fields the
//! aggregator reads get typed access, so schema drift in a backend never
//! breaks the gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single JSON object returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The value of `field` as a comparable key.
    pub fn key(&self, field: &str) -> Option<RecordKey> {
        self.get(field).and_then(RecordKey::from_value)
    }
}

/// An identifier compared by value.
///
/// `2`, `2.0` and `"2"` are the same key; any other string is compared as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(RecordKey::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(RecordKey::Text(u.to_string()))
                } else {
                    n.as_f64().and_then(integral).map(RecordKey::Int)
                }
            }
            Value::String(s) => Some(Self::parse(s)),
            _ => None,
        }
    }

    /// Key from textual input such as a path segment.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(i) => RecordKey::Int(i),
            Err(_) => RecordKey::Text(trimmed.to_string()),
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_encodings_compare_equal() {
        let want = RecordKey::parse("2");
        assert_eq!(doc(json!({"userId": 2})).key("userId"), Some(want.clone()));
        assert_eq!(doc(json!({"userId": 2.0})).key("userId"), Some(want.clone()));
        assert_eq!(doc(json!({"userId": "2"})).key("userId"), Some(want));
        assert_ne!(doc(json!({"userId": 2.5})).key("userId"), Some(RecordKey::Int(2)));
    }

    #[test]
    fn test_missing_or_structured_keys() {
        assert_eq!(doc(json!({"id": 1})).key("userId"), None);
        assert_eq!(doc(json!({"userId": null})).key("userId"), None);
        assert_eq!(doc(json!({"userId": [2]})).key("userId"), None);
    }

    #[test]
    fn test_round_trip_preserves_unknown_fields() {
        let original = json!({"id": 1, "name": "Ann", "meta": {"tags": ["a"]}});
        let value = serde_json::to_value(doc(original.clone())).unwrap();
        assert_eq!(value, original);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(serde_json::from_value::<Document>(json!([1, 2])).is_err());
    }
}
