//! Source record representation.
//!
//! Records arrive from the source store as loosely typed JSON objects.
//! Before type inference they are normalized into an ordered mapping of
//! attribute name to `AttrValue`, the tagged union the rest of the system
//! works with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single attribute value as read from the source store.
///
/// The union is deliberately minimal: the source store is schemaless, so
/// everything that is not numeric is carried as a string, and missing
/// values are explicit rather than implied by map absence (a record can
/// name an attribute and still have no value for it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Numeric value (integer or decimal, stored as f64)
    Num(f64),
    /// String value
    Str(String),
    /// Attribute present but without a usable value
    Absent,
}

impl AttrValue {
    /// Convert a JSON value into an attribute value.
    ///
    /// Booleans and nested structures have no column representation and
    /// are stringified; null maps to `Absent`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() => AttrValue::Num(f),
                _ => AttrValue::Str(n.to_string()),
            },
            serde_json::Value::String(s) => AttrValue::Str(s.clone()),
            serde_json::Value::Null => AttrValue::Absent,
            serde_json::Value::Bool(b) => AttrValue::Str(b.to_string()),
            other => AttrValue::Str(other.to_string()),
        }
    }

    /// String form of the value, if it has one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric form of the value, parsing strings when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Num(n) => Some(*n),
            AttrValue::Str(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            AttrValue::Absent => None,
        }
    }

    /// Render the value for storage in a string column.
    pub fn display_string(&self) -> Option<String> {
        match self {
            AttrValue::Str(s) => Some(s.clone()),
            AttrValue::Num(n) => {
                // Integers print without a trailing .0
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            AttrValue::Absent => None,
        }
    }
}

/// One source record: an ordered attribute map.
///
/// Attribute names keep their source casing here; case folding happens in
/// the export pipeline so the original record stays inspectable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object. Non-object values yield an
    /// empty record rather than an error; the store layer reports those
    /// as corruption before we get here.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut attrs = BTreeMap::new();
        if let Some(map) = value.as_object() {
            for (name, v) in map {
                attrs.insert(name.clone(), AttrValue::from_json(v));
            }
        }
        Self { attrs }
    }

    /// Serialize back to a JSON object for storage.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.attrs {
            let v = match value {
                AttrValue::Num(n) => serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                AttrValue::Str(s) => serde_json::Value::String(s.clone()),
                AttrValue::Absent => serde_json::Value::Null,
            };
            map.insert(name.clone(), v);
        }
        serde_json::Value::Object(map)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AttrValue) {
        self.attrs.insert(name.into(), value);
    }

    /// Look up an attribute ignoring case.
    pub fn get_ci(&self, name: &str) -> Option<&AttrValue> {
        let folded = name.to_lowercase();
        self.attrs
            .iter()
            .find(|(k, _)| k.to_lowercase() == folded)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}
