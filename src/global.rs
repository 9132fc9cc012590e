//! Process-wide default store.
//!
//! A host installs one [`Store`] at startup with [`init`] (or
//! [`init_from_config`]) and then uses the free functions here from anywhere.
//! There is a single slot: installing again replaces the previous store and
//! hands it back. The slot is never cleared otherwise, so the installed store
//! lives until the process exits or it is replaced.
//!
//! Every convenience function runs without a transaction. For transactional
//! work, fetch the store with [`store`] and use [`Store::transaction`].
//!
//! ```rust
//! use metakv::{Database, Store, StoreOptions, Value, global};
//!
//! let db = Database::in_memory()?;
//! global::init(Store::open(&db, StoreOptions::default())?);
//!
//! global::put("greeting", Value::from("hello"))?;
//! assert_eq!(global::get("greeting")?, Value::from("hello"));
//! # Ok::<(), metakv::Error>(())
//! ```

use crate::config::MetaKvConfig;
use crate::models::{Entry, ListFilter, Page, Value};
use crate::storage::{Database, KeyValueStore, PrefixView, Store, StoreOptions};
use crate::{Error, Result};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

static GLOBAL: RwLock<Option<Store>> = RwLock::new(None);

/// Installs `store` as the process-wide default; returns the one it replaced.
pub fn init(store: Store) -> Option<Store> {
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    let previous = slot.replace(store);
    drop(slot);
    if previous.is_some() {
        info!("Replaced global store");
    }
    previous
}

/// Opens the configured database and installs a store on it.
///
/// The configured sweep schedule is installed when called from inside a
/// Tokio runtime; outside one it is skipped with a warning.
///
/// # Errors
///
/// Returns an error if the database or table cannot be opened, or the sweep
/// schedule is invalid.
pub fn init_from_config(config: &MetaKvConfig) -> Result<Store> {
    let db = Database::open(&config.database_path)?;
    let store = Store::open(
        &db,
        StoreOptions::default().with_table_name(config.table_name.clone()),
    )?;

    if let Some(schedule) = config.parsed_gc_schedule()? {
        if tokio::runtime::Handle::try_current().is_ok() {
            store.monitor(&schedule)?;
        } else {
            warn!(schedule = %schedule, "No Tokio runtime; scheduled sweeps disabled");
        }
    }

    init(store.clone());
    info!(
        database = %config.database_path.display(),
        table = %config.table_name,
        "Global store initialized"
    );
    Ok(store)
}

/// Returns the installed store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] before [`init`] has been called.
pub fn store() -> Result<Store> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(Error::NotInitialized)
}

/// [`KeyValueStore::get`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn get(key: &str) -> Result<Value> {
    store()?.get(key, None)
}

/// [`KeyValueStore::get_or_default`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn get_or_default(key: &str, default: Value) -> Result<Value> {
    store()?.get_or_default(key, default, None)
}

/// [`KeyValueStore::get_or_null`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn get_or_null(key: &str) -> Result<Value> {
    store()?.get_or_null(key, None)
}

/// [`KeyValueStore::has`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn has(key: &str) -> Result<bool> {
    store()?.has(key, None)
}

/// [`KeyValueStore::put`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn put(key: &str, value: Value) -> Result<()> {
    store()?.put(key, value, None)
}

/// [`KeyValueStore::assign`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn assign(key: &str, value: Value) -> Result<()> {
    store()?.assign(key, value, None)
}

/// [`KeyValueStore::delete`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn delete(key: &str) -> Result<bool> {
    store()?.delete(key, None)
}

/// [`KeyValueStore::expire`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn expire(key: &str, ttl: Duration) -> Result<()> {
    store()?.expire(key, ttl, None)
}

/// [`KeyValueStore::count`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn count(filter: &ListFilter) -> Result<u64> {
    store()?.count(filter, None)
}

/// [`KeyValueStore::all`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn all(filter: &ListFilter, page: Page) -> Result<Vec<Entry>> {
    store()?.all(filter, page, None)
}

/// [`KeyValueStore::gc`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn gc() -> Result<usize> {
    store()?.gc(None)
}

/// [`KeyValueStore::clear`] on the global store.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] or the store's error.
pub fn clear() -> Result<()> {
    store()?.clear(None)
}

/// [`Store::prefix`] on the global store.
///
/// The view keeps the store it was created from, even if the global store is
/// replaced afterwards.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] before [`init`] has been called.
pub fn prefix(prefix: &str) -> Result<PrefixView> {
    Ok(store()?.prefix(prefix))
}
