//! Filters and pagination for `count` and `all`.

use crate::storage::Predicate;

/// Restricts which rows `count` and `all` consider.
///
/// The default filter matches every live row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    /// Wildcard pattern over keys (`*` any run, `?` one character).
    pub pattern: Option<String>,
    /// Literal text every key must start with; `pattern` then applies to the rest.
    ///
    /// Unlike `pattern`, every character here matches only itself.
    pub key_prefix: Option<String>,
    /// Also consider expired rows that have not been swept yet.
    pub include_expired: bool,
    /// Additional predicate ANDed onto the generated one, passed through verbatim.
    pub extra: Option<Predicate>,
}

impl ListFilter {
    /// Creates a filter that matches every live row.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pattern: None,
            key_prefix: None,
            include_expired: false,
            extra: None,
        }
    }

    /// Restricts keys to a wildcard pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Restricts keys to those starting with `prefix`, matched literally.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Includes expired-but-unswept rows.
    #[must_use]
    pub const fn with_include_expired(mut self, include: bool) -> Self {
        self.include_expired = include;
        self
    }

    /// Adds an administrative predicate.
    #[must_use]
    pub fn with_extra(mut self, predicate: Predicate) -> Self {
        self.extra = Some(predicate);
        self
    }
}

/// Offset/limit window for `all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: Option<usize>,
    /// Maximum rows to return.
    pub limit: Option<usize>,
}

impl Page {
    /// Every row.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            offset: None,
            limit: None,
        }
    }

    /// `limit` rows starting at `offset`.
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }

    /// Every row starting at `offset`.
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_matches_live_rows_only() {
        let filter = ListFilter::default();
        assert!(filter.pattern.is_none());
        assert!(filter.key_prefix.is_none());
        assert!(!filter.include_expired);
        assert!(filter.extra.is_none());
        assert_eq!(filter, ListFilter::new());
    }

    #[test]
    fn test_filter_builders() {
        let filter = ListFilter::new()
            .with_pattern("key-*")
            .with_key_prefix("ns_")
            .with_include_expired(true)
            .with_extra(Predicate::is_null("expires"));
        assert_eq!(filter.pattern.as_deref(), Some("key-*"));
        assert_eq!(filter.key_prefix.as_deref(), Some("ns_"));
        assert!(filter.include_expired);
        assert_eq!(filter.extra, Some(Predicate::is_null("expires")));
    }

    #[test]
    fn test_page_constructors() {
        assert_eq!(Page::all(), Page::default());
        assert_eq!(Page::new(2, 3).offset, Some(2));
        assert_eq!(Page::new(2, 3).limit, Some(3));
        assert_eq!(Page::from_offset(4).limit, None);
    }
}
