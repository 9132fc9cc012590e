//! # metakv
//!
//! An expiring key-value metadata store layered on a single SQLite table.
//!
//! Applications that need a small persistent settings table get typed
//! get/put/delete operations without writing SQL, plus:
//!
//! - Per-key expiration with lazy filtering on every read path
//! - Scheduled garbage collection that never keeps its store alive
//! - Key-prefix namespacing through composable [`PrefixView`]s
//! - Wildcard (`*`, `?`) counting and listing
//! - Shallow-merge updates of structured values ([`Store::assign`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use metakv::{Database, KeyValueStore, Store, StoreOptions, Value};
//! use std::time::Duration;
//!
//! let db = Database::in_memory()?;
//! let store = Store::open(&db, StoreOptions::default())?;
//!
//! store.put("theme", Value::from("dark"), None)?;
//! store.expire("theme", Duration::from_secs(3600), None)?;
//!
//! let users = store.prefix("users:");
//! users.assign("42", Value::from(serde_json::json!({ "name": "ada" })), None)?;
//! assert!(store.has("users:42", None)?);
//! # Ok::<(), metakv::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod gc;
pub mod global;
pub mod models;
pub mod observability;
pub mod storage;

pub use config::MetaKvConfig;
pub use gc::{GcSchedule, GcTask, ManualScheduler, ScheduleHandle, Scheduler, TokioScheduler};
pub use models::{Entry, ListFilter, Page, Value};
pub use storage::{
    ColumnDef, Database, ExtraColumns, IndexDef, KeyValueStore, Predicate, PrefixView, Row,
    SqlValue, SqliteTable, Store, StoreOptions, Table, Transaction,
};

/// Error type for metakv operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `KeyNotFound` | `get`, `expire` or `ttl` address a key with no live row |
/// | `CorruptValue` | Stored text cannot be decoded back into a [`Value`] |
/// | `Database` | Any SQLite failure, passed through untouched |
/// | `InvalidInput` | Bad identifiers, cron expressions or foreign transaction handles |
/// | `OperationFailed` | Filesystem, config, logging or scheduler setup failures |
/// | `NotInitialized` | The [`global`] facade is used before [`global::init`] |
#[derive(Debug, ThisError)]
pub enum Error {
    /// No live row exists for the key.
    ///
    /// Expected in normal control flow; use `get_or_default` or `has`
    /// when absence is not exceptional.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The stored text is not a valid encoded value.
    #[error("corrupt value: {0}")]
    CorruptValue(String),

    /// The underlying SQLite engine reported an error.
    ///
    /// The engine error is kept as-is so callers can inspect
    /// constraint violations, busy states and the like.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A table, column or index name is not a plain SQL identifier
    /// - A declared column type is not one SQLite understands
    /// - A cron expression fails to parse
    /// - A transaction handle is used with a table from another database
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation outside the database failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The global store has not been initialized.
    #[error("global store not initialized; call metakv::global::init first")]
    NotInitialized,
}

/// Result type alias for metakv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use metakv::current_timestamp_millis;
///
/// assert!(current_timestamp_millis() > 0);
/// ```
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
