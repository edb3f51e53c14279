//! Path prefix matching.
//!
//! # Design Decisions
//! - Prefix must end on a segment boundary: `/site-4` does not match `/site-42`
//! - Path matching is case-sensitive
//! - The empty prefix matches every path

/// Matches a request path against a site's local prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a matcher. A trailing '/' on the prefix is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Return the part of `path` after the prefix, if it matches.
    ///
    /// The remainder is either empty or starts with '/'.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}
