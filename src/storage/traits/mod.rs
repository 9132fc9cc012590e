//! Storage traits.

mod kv;
mod table;

pub use kv::KeyValueStore;
pub use table::{
    EXPIRES_COLUMN, ExtraColumns, KEY_COLUMN, Predicate, Row, Table, VALUE_COLUMN,
};
