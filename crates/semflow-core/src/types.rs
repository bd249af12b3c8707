//! Field values carried by records.
//!
//! Kept deliberately small: LLM-produced answers are strings, aggregates are
//! numbers, file payloads are bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::schema::FieldType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(FieldType::Boolean),
            Value::Int(_) | Value::Float(_) => Some(FieldType::Numeric),
            Value::Str(_) => Some(FieldType::String),
            Value::Bytes(_) => Some(FieldType::Bytes),
            Value::List(_) => Some(FieldType::List),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Numeric coercion used by averaging.
    ///
    /// Strings are parsed after trimming; booleans count as 0/1. Null, bytes,
    /// lists, and non-finite parses do not coerce.
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Plain JSON rendering (bytes become a length marker when `elide_bytes`).
    pub fn to_json(&self, elide_bytes: bool) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => Json::from(*f),
            Value::Str(s) => Json::String(s.clone()),
            Value::Bytes(b) if elide_bytes => Json::String(format!("[binary {} bytes]", b.len())),
            Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
            Value::List(items) => {
                Json::Array(items.iter().map(|v| v.to_json(elide_bytes)).collect())
            }
        }
    }

    /// Best-effort conversion from plain JSON (numbers that fit in i64 stay integral).
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(_) => Value::Str(json.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_accepts_numbers_and_numeric_strings() {
        assert_eq!(Value::Int(4).coerce_f64(), Some(4.0));
        assert_eq!(Value::Float(2.5).coerce_f64(), Some(2.5));
        assert_eq!(Value::from(" 7 ").coerce_f64(), Some(7.0));
        assert_eq!(Value::Bool(true).coerce_f64(), Some(1.0));
        assert_eq!(Value::from("x").coerce_f64(), None);
        assert_eq!(Value::from("NaN").coerce_f64(), None);
        assert_eq!(Value::Null.coerce_f64(), None);
        assert_eq!(Value::Bytes(vec![1]).coerce_f64(), None);
    }

    #[test]
    fn json_roundtrip_keeps_integers_integral() {
        let v = Value::from_json(&serde_json::json!(3));
        assert_eq!(v, Value::Int(3));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Float(1.5));
    }
}
