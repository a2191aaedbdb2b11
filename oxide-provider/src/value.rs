//! Attribute maps used for desired configuration and recorded state.
//!
//! Both sides of a reconciliation are plain JSON-compatible maps so that the
//! host can persist them and the engine can validate them against a schema
//! without knowing the resource kind. A `null` value and a missing key mean
//! the same thing: the attribute is unset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Attribute name holding the remote identifier.
pub const ID: &str = "id";

/// Errors from reading typed values out of an attribute map.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("attribute \"{0}\" is required")]
    Missing(String),

    #[error("attribute \"{name}\" must be {expected}")]
    WrongType { name: String, expected: &'static str },

    #[error("attribute \"{name}\" is out of range: {value}")]
    OutOfRange { name: String, value: i64 },

    #[error("attributes must be a JSON object")]
    NotAnObject,

    #[error("exactly one of {0} must be set")]
    Source(String),
}

impl ValueError {
    /// Attribute the error is about, if it names exactly one.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            ValueError::Missing(name)
            | ValueError::WrongType { name, .. }
            | ValueError::OutOfRange { name, .. } => Some(name),
            ValueError::NotAnObject | ValueError::Source(_) => None,
        }
    }
}

/// A set of named attribute values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object.
    pub fn from_json(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            _ => Err(ValueError::NotAnObject),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect::<Map<String, Value>>())
    }

    /// Value of `name`, treating `null` as unset.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Set `name`, or mark it unset when `value` is `None`.
    pub fn set_opt<V: Into<Value>>(&mut self, name: &str, value: Option<V>) {
        let value = value.map(Into::into).unwrap_or(Value::Null);
        self.0.insert(name.to_string(), value);
    }

    /// Copy `name` from `other`, including its absence.
    pub fn copy_from(&mut self, other: &Attributes, name: &str) {
        match other.get(name) {
            Some(v) => self.set(name, v.clone()),
            None => {
                self.0.remove(name);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Names of attributes with a value.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The remote identifier, once the object exists.
    pub fn id(&self) -> Option<&str> {
        self.get(ID).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn string(&self, name: &str) -> Result<Option<&str>, ValueError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(ValueError::WrongType {
                name: name.to_string(),
                expected: "a string",
            }),
        }
    }

    pub fn require_string(&self, name: &str) -> Result<&str, ValueError> {
        self.string(name)?
            .ok_or_else(|| ValueError::Missing(name.to_string()))
    }

    pub fn int64(&self, name: &str) -> Result<Option<i64>, ValueError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| ValueError::WrongType {
                name: name.to_string(),
                expected: "an integer",
            }),
        }
    }

    pub fn require_int64(&self, name: &str) -> Result<i64, ValueError> {
        self.int64(name)?
            .ok_or_else(|| ValueError::Missing(name.to_string()))
    }

    /// Non-negative integer as `u64`.
    pub fn unsigned(&self, name: &str) -> Result<Option<u64>, ValueError> {
        self.int64(name)?
            .map(|v| {
                u64::try_from(v).map_err(|_| ValueError::OutOfRange {
                    name: name.to_string(),
                    value: v,
                })
            })
            .transpose()
    }

    pub fn require_unsigned(&self, name: &str) -> Result<u64, ValueError> {
        self.unsigned(name)?
            .ok_or_else(|| ValueError::Missing(name.to_string()))
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, ValueError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(ValueError::WrongType {
                name: name.to_string(),
                expected: "a boolean",
            }),
        }
    }

    pub fn object(&self, name: &str) -> Result<Option<&Map<String, Value>>, ValueError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(ValueError::WrongType {
                name: name.to_string(),
                expected: "an object",
            }),
        }
    }
}

impl From<BTreeMap<String, Value>> for Attributes {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Attributes {
    fn from(pairs: [(&str, Value); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}
