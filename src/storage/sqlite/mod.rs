//! `SQLite` infrastructure for the table store.
//!
//! ## Module Structure
//!
//! - `connection`: connection locking, re-entry detection and pragma configuration
//! - `sql`: wildcard translation, identifier quoting, predicate rendering
//! - `table`: [`Database`], [`Transaction`] and the [`SqliteTable`] backend

mod connection;
mod sql;
mod table;

pub use connection::{ConnectionGuard, acquire_lock, configure_connection, lock_connection};
pub use sql::{
    escape_like_literal, glob_to_like_pattern, quote_identifier, render_predicate, validate_identifier,
};
pub use table::{ColumnDef, Database, IndexDef, SqliteTable, TableSchema, Transaction};
