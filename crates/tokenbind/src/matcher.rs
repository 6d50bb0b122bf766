//! URL pattern matching for the pattern addressing mode.
//!
//! A pattern containing `*` is a glob that may match anywhere inside the URL,
//! with `*` standing for any sequence and every other character literal.
//! A pattern without `*` is a plain substring test, optionally widened by
//! reverse containment (the pattern contains the URL), which tolerates a
//! pattern that is a full URL longer than the observed one.

use regex::{Regex, RegexBuilder};

use crate::error::{BindError, Result};

/// Multi-character wildcard in URL patterns.
pub const WILDCARD: char = '*';

/// Matches a URL against a pattern with reverse containment enabled.
///
/// Empty inputs never match.
///
/// ```
/// use tokenbind::matcher::matches;
///
/// assert!(matches("https://api.example.com/v1/users", "api.example.com/v1/*"));
/// assert!(matches("https://api.example.com/v1/users", "/v1/users"));
/// assert!(!matches("https://api.example.com/v2/users", "api.example.com/v1/*"));
/// assert!(!matches("", "api"));
/// ```
pub fn matches(url: &str, pattern: &str) -> bool {
    matches_with(url, pattern, true)
}

/// Matches a URL against a pattern, choosing whether a pattern that contains
/// the URL also counts as a match.
pub fn matches_with(url: &str, pattern: &str, reverse_containment: bool) -> bool {
    if url.is_empty() || pattern.is_empty() {
        return false;
    }
    if pattern.contains(WILDCARD) {
        return compile_wildcard(pattern).is_ok_and(|re| re.is_match(url));
    }
    substring_match(url, pattern, reverse_containment)
}

fn substring_match(url: &str, pattern: &str, reverse_containment: bool) -> bool {
    url.contains(pattern) || (reverse_containment && pattern.contains(url))
}

fn compile_wildcard(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let expr = pattern
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    RegexBuilder::new(&expr).dot_matches_new_line(true).build()
}

/// A URL pattern compiled once when a binding is applied.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    wildcard: Option<Regex>,
}

impl UrlPattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is blank or its wildcard form exceeds
    /// the regex size limits.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(BindError::EmptyField("url pattern"));
        }
        let wildcard = if raw.contains(WILDCARD) {
            Some(compile_wildcard(&raw).map_err(|e| {
                BindError::Config(format!("Cannot compile URL pattern '{raw}': {e}"))
            })?)
        } else {
            None
        };
        Ok(Self { raw, wildcard })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Same semantics as [`matches_with`] without recompiling.
    pub fn matches(&self, url: &str, reverse_containment: bool) -> bool {
        if url.is_empty() {
            return false;
        }
        self.wildcard.as_ref().map_or_else(
            || substring_match(url, &self.raw, reverse_containment),
            |re| re.is_match(url),
        )
    }
}
