//! SQL helper functions for the `SQLite` table.
//!
//! This module provides:
//! - Wildcard pattern conversion to SQL LIKE patterns
//! - Identifier validation and quoting
//! - Rendering of [`Predicate`] trees into WHERE clauses with numbered parameters

use crate::storage::Predicate;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;

/// Plain SQL identifiers: letters, digits and underscores, not starting with a digit.
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a literal; a failure here is a programming error caught by tests.
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap()
});

/// Converts a wildcard key pattern to a SQL LIKE pattern.
///
/// `*` (any run of characters) becomes `%` and `?` (exactly one character)
/// becomes `_`. Every other character passes through unchanged, including
/// literal `%` and `_`, which LIKE then treats as wildcards. Callers that
/// need those characters matched literally must avoid them in patterns.
///
/// # Examples
///
/// ```
/// use metakv::storage::sqlite::glob_to_like_pattern;
///
/// assert_eq!(glob_to_like_pattern("key-*"), "key-%");
/// assert_eq!(glob_to_like_pattern("v?"), "v_");
/// assert_eq!(glob_to_like_pattern("100%"), "100%");
/// ```
#[must_use]
pub fn glob_to_like_pattern(pattern: &str) -> String {
    pattern
        .chars()
        .map(|c| match c {
            '*' => '%',
            '?' => '_',
            _ => c,
        })
        .collect()
}

/// Escapes text so that it matches itself inside a LIKE pattern with `ESCAPE '\'`.
///
/// ```
/// use metakv::storage::sqlite::escape_like_literal;
///
/// assert_eq!(escape_like_literal("user_"), "user\\_");
/// assert_eq!(escape_like_literal("50%"), "50\\%");
/// ```
#[must_use]
pub fn escape_like_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Validates an identifier and returns it double-quoted.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the name is not a plain identifier.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

/// Validates a table, column or index name.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the name is not a plain identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "'{name}' is not a valid SQL identifier"
        )))
    }
}

/// Renders a predicate into a SQL condition.
///
/// Parameters are appended to `params` and referenced as `?N`, numbered
/// from the current length of `params` plus one.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if a column name is not a plain identifier.
pub fn render_predicate(predicate: &Predicate, params: &mut Vec<SqlValue>) -> Result<String> {
    let sql = match predicate {
        Predicate::True => "1 = 1".to_string(),
        Predicate::Eq(column, value) => {
            let column = quote_identifier(column)?;
            format!("{column} = {}", push_param(params, value.clone()))
        },
        Predicate::IsNull(column) => format!("{} IS NULL", quote_identifier(column)?),
        Predicate::Gt(column, value) => {
            let column = quote_identifier(column)?;
            format!("{column} > {}", push_param(params, value.clone()))
        },
        Predicate::Le(column, value) => {
            let column = quote_identifier(column)?;
            format!("{column} <= {}", push_param(params, value.clone()))
        },
        Predicate::Like(column, pattern) => {
            let column = quote_identifier(column)?;
            format!(
                "{column} LIKE {}",
                push_param(params, SqlValue::Text(pattern.clone()))
            )
        },
        Predicate::LikeEscaped(column, pattern) => {
            let column = quote_identifier(column)?;
            format!(
                "{column} LIKE {} ESCAPE '\\'",
                push_param(params, SqlValue::Text(pattern.clone()))
            )
        },
        Predicate::And(parts) => render_group(parts, " AND ", "1 = 1", params)?,
        Predicate::Or(parts) => render_group(parts, " OR ", "1 = 0", params)?,
        Predicate::Not(inner) => format!("NOT ({})", render_predicate(inner, params)?),
    };
    Ok(sql)
}

fn render_group(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
    params: &mut Vec<SqlValue>,
) -> Result<String> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let rendered = parts
        .iter()
        .map(|p| render_predicate(p, params).map(|sql| format!("({sql})")))
        .collect::<Result<Vec<_>>>()?;
    Ok(rendered.join(separator))
}

fn push_param(params: &mut Vec<SqlValue>, value: SqlValue) -> String {
    params.push(value);
    format!("?{}", params.len())
}

/// Builds a ` LIMIT .. OFFSET ..` suffix.
///
/// SQLite requires a LIMIT before OFFSET; `-1` means unbounded.
#[must_use]
pub fn limit_clause(offset: Option<usize>, limit: Option<usize>) -> String {
    match (offset, limit) {
        (None, None) => String::new(),
        (None, Some(limit)) => format!(" LIMIT {limit}"),
        (Some(offset), None) => format!(" LIMIT -1 OFFSET {offset}"),
        (Some(offset), Some(limit)) => format!(" LIMIT {limit} OFFSET {offset}"),
    }
}
