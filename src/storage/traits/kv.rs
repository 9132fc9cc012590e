//! Store capability set shared by [`Store`](crate::Store) and
//! [`PrefixView`](crate::PrefixView).

use super::ExtraColumns;
use crate::gc::GcSchedule;
use crate::models::{Entry, ListFilter, Page, Value};
use crate::storage::Transaction;
use crate::{Error, Result};
use std::time::Duration;

/// Operations every key-value store offers.
///
/// Only live rows are visible: a row whose expiration has passed is treated
/// as missing by every method except [`KeyValueStore::gc`], [`KeyValueStore::clear`]
/// and listings that opt into [`ListFilter::include_expired`].
///
/// All methods accept an optional transaction handle from
/// [`Database::transaction`](crate::Database::transaction).
pub trait KeyValueStore: Send + Sync {
    /// Returns the value of a live key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if no live row exists.
    fn get(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Value> {
        match self.get_optional(key, tx)? {
            Some(value) => Ok(value),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }

    /// Returns the value of a live key, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or the value is corrupt.
    fn get_optional(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Option<Value>>;

    /// Returns the value of a live key, or `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or the value is corrupt.
    fn get_or_default(
        &self,
        key: &str,
        default: Value,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Value> {
        Ok(self.get_optional(key, tx)?.unwrap_or(default))
    }

    /// Returns the value of a live key, or [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or the value is corrupt.
    fn get_or_null(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Value> {
        self.get_or_default(key, Value::Null, tx)
    }

    /// Returns `true` if a live row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    fn has(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool>;

    /// Inserts or replaces a value and clears its expiration.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn put(&self, key: &str, value: Value, tx: Option<&Transaction<'_>>) -> Result<()> {
        self.put_with(key, value, &ExtraColumns::new(), tx)
    }

    /// [`KeyValueStore::put`] that also sets extension columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn put_with(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: Option<&Transaction<'_>>,
    ) -> Result<()>;

    /// Shallow-merges an object into the stored object, or overwrites.
    ///
    /// Scalars, `null` and absent values overwrite. Objects merge into a
    /// stored object (incoming fields win); anything else overwrites.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or written.
    fn assign(&self, key: &str, value: Value, tx: Option<&Transaction<'_>>) -> Result<()> {
        self.assign_with(key, value, &ExtraColumns::new(), tx)
    }

    /// [`KeyValueStore::assign`] that also sets extension columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or written.
    fn assign_with(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: Option<&Transaction<'_>>,
    ) -> Result<()>;

    /// Deletes a live key; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn delete(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool>;

    /// Makes a live key expire `ttl` from now.
    ///
    /// On a [`PrefixView`](crate::storage::PrefixView) the key is *not*
    /// prefixed: pass the full backing key. `view.expire("a", ..)` fails with
    /// [`Error::KeyNotFound`] even when `view.get("a", ..)` finds the value
    /// stored under `"<prefix>a"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if no live row exists.
    fn expire(&self, key: &str, ttl: Duration, tx: Option<&Transaction<'_>>) -> Result<()>;

    /// Remaining lifetime of a live key; `None` if it never expires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if no live row exists.
    fn ttl(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Option<Duration>>;

    /// Clears the expiration of a live key; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn persist(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool>;

    /// Physically deletes every expired row; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn gc(&self, tx: Option<&Transaction<'_>>) -> Result<usize>;

    /// Deletes every row, live or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    fn clear(&self, tx: Option<&Transaction<'_>>) -> Result<()>;

    /// Counts rows matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    fn count(&self, filter: &ListFilter, tx: Option<&Transaction<'_>>) -> Result<u64>;

    /// Lists rows matching the filter, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or a value is corrupt.
    fn all(
        &self,
        filter: &ListFilter,
        page: Page,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Vec<Entry>>;

    /// Installs a scheduled sweep, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule cannot be registered.
    fn monitor(&self, schedule: &GcSchedule) -> Result<()>;
}
