//! Listing results.

use super::Value;

/// A live key/value pair returned by listing operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The key as seen by the caller (prefix views strip their prefix).
    pub key: String,
    /// The decoded value.
    pub value: Value,
}

impl Entry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
