//! Dynamic values for path lookups.
//!
//! A [`Value`] is a scalar or a collection of derivations. Collections are
//! held by handle, so two values are equal only if they share the same
//! collection.

use std::fmt;

use serde_json::{Map, Number, Value as Json};

use crate::collections::{DerivedArray, DerivedDict};
use crate::error::Result;
use crate::reactive::{Runtime, Tracker};

/// A structure that pointers can walk.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(DerivedArray<Value>),
    Dict(DerivedDict<Value>),
}

impl Value {
    /// Build a value from JSON. Nested arrays and objects become fresh
    /// source collections in `runtime`.
    pub fn from_json(runtime: &Runtime, json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|item| Value::from_json(runtime, item))
                    .collect();
                Value::Array(runtime.array(items).as_derived())
            }
            Json::Object(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|(key, item)| (key, Value::from_json(runtime, item)));
                Value::Dict(runtime.dict(entries).as_derived())
            }
        }
    }

    /// Materialize as JSON, reading every nested collection through
    /// `tracker`.
    ///
    /// Numbers that JSON cannot represent (NaN, infinities) become `null`.
    pub fn to_json(&self, tracker: &mut Tracker) -> Result<Json> {
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(array) => {
                let len = tracker.get(&array.length())?;
                let mut items = Vec::with_capacity(len);
                for index in 0..len {
                    let item = tracker.get(&array.index(index))?;
                    items.push(item.to_json(tracker)?);
                }
                Json::Array(items)
            }
            Value::Dict(dict) => {
                let mut entries = Map::new();
                for key in tracker.get(&dict.keys())? {
                    if let Some(item) = tracker.get(&dict.at(&key))? {
                        let item = item.to_json(tracker)?;
                        entries.insert(key, item);
                    }
                }
                Json::Object(entries)
            }
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&DerivedArray<Value>> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&DerivedDict<Value>> {
        match self {
            Value::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Array(array) => f.debug_tuple("Array").field(array).finish(),
            Value::Dict(dict) => f.debug_tuple("Dict").field(dict).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(runtime: &Runtime, json: Json) -> Json {
        let value = Value::from_json(runtime, json);
        runtime.derive(move |t| value.to_json(t)).get().unwrap()
    }

    #[test]
    fn json_structure_survives() {
        let runtime = Runtime::new();
        let doc = json!({"name": "box", "size": [1.0, 2.5], "meta": {"hidden": false, "tag": null}});
        assert_eq!(round_trip(&runtime, doc.clone()), doc);
    }

    #[test]
    fn collections_compare_by_identity() {
        let runtime = Runtime::new();
        let a = Value::from_json(&runtime, json!([1]));
        let b = Value::from_json(&runtime, json!([1]));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::from(1.0), Value::Number(1.0));
    }

    #[test]
    fn non_finite_numbers_become_null() {
        let runtime = Runtime::new();
        let value = Value::Number(f64::INFINITY);
        let json = runtime.derive(move |t| value.to_json(t)).get().unwrap();
        assert_eq!(json, Json::Null);
    }
}
