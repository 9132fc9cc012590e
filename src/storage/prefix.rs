//! Key namespacing over any [`KeyValueStore`].

use super::{ExtraColumns, KeyValueStore, Transaction};
use crate::gc::GcSchedule;
use crate::models::{Entry, ListFilter, Page, Value};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// A store view that prepends a fixed prefix to every key.
///
/// Key-addressed operations (`get`, `has`, `put`, `assign`, `delete`,
/// `ttl`, `persist`) rewrite the key. `count` and `all` only consider keys
/// that literally start with the prefix (wildcard characters in the prefix
/// match themselves), and `all` strips it from returned keys.
///
/// `expire`, `gc`, `clear` and `monitor` are forwarded to the backing store
/// unchanged: `expire` addresses the backing key as given, and `gc`/`clear`
/// act on the whole table, not just the prefix.
///
/// Views nest: `store.prefix("a:").prefix("b:")` addresses keys starting
/// with `a:b:`.
#[derive(Clone)]
pub struct PrefixView {
    backing: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl std::fmt::Debug for PrefixView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixView")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PrefixView {
    /// Wraps `backing`, which may itself be a view.
    #[must_use]
    pub fn new(backing: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            backing,
            prefix: prefix.into(),
        }
    }

    /// Returns a view on the same backing store with `prefix` appended.
    #[must_use]
    pub fn prefix(&self, prefix: &str) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            prefix: format!("{}{prefix}", self.prefix),
        }
    }

    /// The full prefix of this view.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn scoped(&self, filter: &ListFilter) -> ListFilter {
        let inner = filter.key_prefix.as_deref().unwrap_or_default();
        ListFilter {
            key_prefix: Some(format!("{}{inner}", self.prefix)),
            ..filter.clone()
        }
    }
}

impl KeyValueStore for PrefixView {
    fn get_optional(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Option<Value>> {
        self.backing.get_optional(&self.key(key), tx)
    }

    fn has(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool> {
        self.backing.has(&self.key(key), tx)
    }

    fn put_with(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: Option<&Transaction<'_>>,
    ) -> Result<()> {
        self.backing.put_with(&self.key(key), value, extra, tx)
    }

    fn assign_with(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: Option<&Transaction<'_>>,
    ) -> Result<()> {
        self.backing.assign_with(&self.key(key), value, extra, tx)
    }

    fn delete(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool> {
        self.backing.delete(&self.key(key), tx)
    }

    // Addresses the backing key as given, without the prefix.
    fn expire(&self, key: &str, ttl: Duration, tx: Option<&Transaction<'_>>) -> Result<()> {
        self.backing.expire(key, ttl, tx)
    }

    fn ttl(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Option<Duration>> {
        self.backing.ttl(&self.key(key), tx)
    }

    fn persist(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool> {
        self.backing.persist(&self.key(key), tx)
    }

    fn gc(&self, tx: Option<&Transaction<'_>>) -> Result<usize> {
        self.backing.gc(tx)
    }

    fn clear(&self, tx: Option<&Transaction<'_>>) -> Result<()> {
        self.backing.clear(tx)
    }

    fn count(&self, filter: &ListFilter, tx: Option<&Transaction<'_>>) -> Result<u64> {
        self.backing.count(&self.scoped(filter), tx)
    }

    fn all(
        &self,
        filter: &ListFilter,
        page: Page,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Vec<Entry>> {
        let entries = self.backing.all(&self.scoped(filter), page, tx)?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let key = entry.key.strip_prefix(self.prefix.as_str())?.to_string();
                Some(Entry {
                    key,
                    value: entry.value,
                })
            })
            .collect())
    }

    fn monitor(&self, schedule: &GcSchedule) -> Result<()> {
        self.backing.monitor(schedule)
    }
}
