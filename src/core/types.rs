//! Parameter values passed to stages and validators.
//!
//! Compiler options and validation parameters are both small maps of scalar
//! values. The map keeps insertion order so logs and serialized output are
//! stable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar parameter value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
}

impl Value {
    /// Get as a string slice, if this is a string.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a float (integers convert implicitly).
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Parse a command-line style value: booleans and numbers are recognised,
    /// anything else stays a string.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => {
                if let Ok(i) = raw.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(f) = raw.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::String(raw.to_string())
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Insertion-ordered map of named parameter values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(IndexMap<String, Value>);

/// Options broadcast to every stage of a compilation pipeline.
pub type CompilerOptions = Parameters;

impl Parameters {
    /// Reserved key under which the validation phase is stored.
    pub const PHASE: &'static str = "phase";

    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Set a parameter, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Check if a parameter is set.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Copy every entry of `other` into this map; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Parameters) {
        for (name, value) in other.iter() {
            self.0.insert(name.to_string(), value.clone());
        }
    }

    /// The validation phase, if one was requested.
    pub fn phase(&self) -> Option<&str> {
        self.get(Self::PHASE).and_then(Value::as_string)
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
