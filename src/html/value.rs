//! Dynamic values produced by the binder.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use super::error::BindError;
use crate::duration::Duration;

/// A bound value.
///
/// Records map field names to values; absent fields are simply missing
/// keys. `Value` serializes to the natural JSON shape (times as RFC 3339,
/// durations as text, bytes as an array of numbers), which is also how
/// [`Value::into_typed`] hands it to serde.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Time(DateTime<FixedOffset>),
    Duration(Duration),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the string if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a key if this is a `Record`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Converts the value into a typed structure through serde.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Typed`] when the shape does not match `T`
    /// (e.g. a required field is absent).
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, BindError> {
        let typed = |source| BindError::Typed {
            type_name: std::any::type_name::<T>(),
            source,
        };
        let json = serde_json::to_value(&self).map_err(typed)?;
        serde_json::from_value(json).map_err(typed)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Uint(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Time(t) => t.serialize(serializer),
            Self::Duration(d) => d.serialize(serializer),
            Self::Bytes(b) => serializer.collect_seq(b),
            Self::List(items) => serializer.collect_seq(items),
            Self::Record(fields) => serializer.collect_map(fields),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
