//! Storage layer.
//!
//! Two layers sit on a single relation:
//! - **Table**: the row-level [`Table`] abstraction and its `SQLite` backend
//! - **Store**: live-row key-value semantics ([`Store`]) and key namespacing ([`PrefixView`])
//!
//! Values cross the boundary through [`codec`].

// Allow significant_drop_tightening - guards in this layer are held for the whole statement.
#![allow(clippy::significant_drop_tightening)]
// Allow cast_possible_wrap/truncation for millisecond and row-count conversions.
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod codec;
mod prefix;
pub mod sqlite;
mod store;
pub mod traits;

pub use prefix::PrefixView;
pub use rusqlite::types::Value as SqlValue;
pub use sqlite::{ColumnDef, Database, IndexDef, SqliteTable, TableSchema, Transaction};
pub use store::{DEFAULT_TABLE_NAME, Store, StoreOptions};
pub use traits::{
    EXPIRES_COLUMN, ExtraColumns, KEY_COLUMN, KeyValueStore, Predicate, Row, Table, VALUE_COLUMN,
};
