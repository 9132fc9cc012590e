//! Data models for metakv.
//!
//! Values as callers see them, listing results and listing filters.

mod entry;
mod filter;
mod value;

pub use entry::Entry;
pub use filter::{ListFilter, Page};
pub use value::Value;
