//! Abstract persistent table.
//!
//! The store only ever talks to its rows through [`Table`]. A table is a
//! relation with a unique text `key`, an encoded text `value`, a nullable
//! `expires` timestamp (Unix milliseconds) and any declared extension columns.

use crate::Result;
use crate::storage::Transaction;
use rusqlite::types::Value as SqlValue;
use std::collections::BTreeMap;

/// Column holding the unique key.
pub const KEY_COLUMN: &str = "key";
/// Column holding the encoded value.
pub const VALUE_COLUMN: &str = "value";
/// Column holding the expiration timestamp.
pub const EXPIRES_COLUMN: &str = "expires";

/// Values for extension columns, keyed by column name.
pub type ExtraColumns = BTreeMap<String, SqlValue>;

/// A persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Unique key.
    pub key: String,
    /// Encoded value text.
    pub value: String,
    /// Expiration in Unix milliseconds; `None` never expires.
    pub expires: Option<i64>,
    /// Extension column values.
    pub extra: ExtraColumns,
}

impl Row {
    /// Creates a row that never expires and has no extension values.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expires: None,
            extra: ExtraColumns::new(),
        }
    }

    /// Returns `true` if the row is visible at `now` (Unix milliseconds).
    #[must_use]
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

/// Row filter understood by every [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// `column = value`.
    Eq(String, SqlValue),
    /// `column IS NULL`.
    IsNull(String),
    /// `column > value`.
    Gt(String, SqlValue),
    /// `column <= value`.
    Le(String, SqlValue),
    /// `column LIKE pattern` (engine pattern syntax).
    Like(String, String),
    /// `column LIKE pattern ESCAPE '\'`, where `\` makes the next character literal.
    LikeEscaped(String, String),
    /// All of the predicates hold. Empty means true.
    And(Vec<Predicate>),
    /// Any of the predicates holds. Empty means false.
    Or(Vec<Predicate>),
    /// The predicate does not hold.
    Not(Box<Predicate>),
}

impl Predicate {
    /// `column = value`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    /// `column IS NULL`.
    #[must_use]
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    /// `column > value`.
    #[must_use]
    pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::Gt(column.into(), value.into())
    }

    /// `column <= value`.
    #[must_use]
    pub fn le(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::Le(column.into(), value.into())
    }

    /// `column LIKE pattern`.
    #[must_use]
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like(column.into(), pattern.into())
    }

    /// `column LIKE pattern ESCAPE '\'`.
    #[must_use]
    pub fn like_escaped(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::LikeEscaped(column.into(), pattern.into())
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Combines with another predicate, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, p) | (p, Self::True) => p,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            },
            (Self::And(mut left), p) => {
                left.push(p);
                Self::And(left)
            },
            (p, Self::And(mut right)) => {
                right.insert(0, p);
                Self::And(right)
            },
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Rows that are live at `now`: `expires IS NULL OR expires > now`.
    #[must_use]
    pub fn live_at(now: i64) -> Self {
        Self::Or(vec![
            Self::is_null(EXPIRES_COLUMN),
            Self::gt(EXPIRES_COLUMN, now),
        ])
    }

    /// Rows whose expiration has passed at `now`: `expires IS NOT NULL AND expires <= now`.
    #[must_use]
    pub fn expired_at(now: i64) -> Self {
        Self::And(vec![
            Self::is_null(EXPIRES_COLUMN).negate(),
            Self::le(EXPIRES_COLUMN, now),
        ])
    }

    /// Row addressed by key.
    #[must_use]
    pub fn key_is(key: &str) -> Self {
        Self::eq(KEY_COLUMN, key.to_string())
    }
}

/// Abstract persistent table.
///
/// Every data method takes an optional transaction handle. With `None` the
/// call runs on its own; with `Some` it joins that transaction. Inside a
/// [`Table::transaction`] callback always pass the handle through.
///
/// `find_all` returns rows ordered by key ascending.
pub trait Table: Send + Sync {
    /// Table name.
    fn name(&self) -> &str;

    /// Returns the first row matching the predicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine query fails.
    fn find_one(&self, predicate: &Predicate, tx: Option<&Transaction<'_>>)
    -> Result<Option<Row>>;

    /// Returns matching rows ordered by key, skipping `offset` and returning at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine query fails.
    fn find_all(
        &self,
        predicate: &Predicate,
        offset: Option<usize>,
        limit: Option<usize>,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Vec<Row>>;

    /// Sets columns on matching rows; returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine update fails.
    fn update(
        &self,
        assignments: &[(&str, SqlValue)],
        predicate: &Predicate,
        tx: Option<&Transaction<'_>>,
    ) -> Result<usize>;

    /// Inserts the row or replaces the row with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine write fails.
    fn upsert(&self, row: &Row, tx: Option<&Transaction<'_>>) -> Result<()>;

    /// Deletes matching rows; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine delete fails.
    fn destroy(&self, predicate: &Predicate, tx: Option<&Transaction<'_>>) -> Result<usize>;

    /// Deletes every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine delete fails.
    fn truncate(&self, tx: Option<&Transaction<'_>>) -> Result<()>;

    /// Counts matching rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine query fails.
    fn count(&self, predicate: &Predicate, tx: Option<&Transaction<'_>>) -> Result<u64>;

    /// Runs `f` inside a transaction: committed on `Ok`, rolled back on `Err`.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or an engine error from begin or commit.
    fn transaction(&self, f: &mut dyn FnMut(&Transaction<'_>) -> Result<()>) -> Result<()>;
}
