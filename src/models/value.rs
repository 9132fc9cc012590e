//! Stored value type.

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number};

/// A value held by a store.
///
/// Mirrors the JSON data model with one extra tag, [`Value::Absent`], so that
/// "stored nothing" stays distinguishable from "stored `null`".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value was provided.
    #[default]
    Absent,
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(Number),
    /// A string.
    String(String),
    /// An array of JSON values.
    Array(Vec<serde_json::Value>),
    /// An object of JSON values.
    Object(Map<String, serde_json::Value>),
}

impl Value {
    /// Converts any serializable type into a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the type cannot be represented as JSON.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::from)
            .map_err(|e| Error::InvalidInput(format!("value is not JSON-representable: {e}")))
    }

    /// Deserializes the value into a concrete type.
    ///
    /// [`Value::Absent`] deserializes like `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value does not have the shape of `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let json = self.clone().into_json().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(json)
            .map_err(|e| Error::InvalidInput(format!("value has unexpected shape: {e}")))
    }

    /// Converts into a JSON value; `Absent` becomes `None`.
    #[must_use]
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Self::Absent => None,
            Self::Null => Some(serde_json::Value::Null),
            Self::Bool(b) => Some(serde_json::Value::Bool(b)),
            Self::Number(n) => Some(serde_json::Value::Number(n)),
            Self::String(s) => Some(serde_json::Value::String(s)),
            Self::Array(a) => Some(serde_json::Value::Array(a)),
            Self::Object(o) => Some(serde_json::Value::Object(o)),
        }
    }

    /// Returns `true` for [`Value::Absent`].
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for absent, null, boolean, number and string values.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !self.is_structured()
    }

    /// Returns `true` for arrays and objects.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    /// Returns the string slice if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number as `i64` if it fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the object map if this is an object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&Map<String, serde_json::Value>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Shallow merge used by `assign`.
    ///
    /// Only object-over-object merges: fields of `incoming` overwrite fields
    /// of `self` one level deep. Every other combination yields `incoming`.
    #[must_use]
    pub fn merged_with(self, incoming: Self) -> Self {
        match (self, incoming) {
            (Self::Object(mut existing), Self::Object(fields)) => {
                existing.extend(fields);
                Self::Object(existing)
            },
            (_, incoming) => incoming,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(a) => Self::Array(a),
            serde_json::Value::Object(o) => Self::Object(o),
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

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}
