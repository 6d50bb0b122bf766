//! Token extraction from response bodies.
//!
//! Two grammars are supported, selected by the shape of the path:
//!
//! - `$.key` is a *lite JSON path*. Only the first segment after `$.` is used.
//!   The body is scanned textually for `"key": "value"` or `"key": value`,
//!   without parsing, so partial or malformed JSON still yields a token. When
//!   the key occurs at several nesting depths the shallowest occurrence wins.
//! - Anything else is a regular expression. The first capture group is
//!   returned when the expression has one, otherwise the whole match.

use regex::Regex;
use tracing::warn;

use crate::error::{BindError, ExtractError, Result};

/// Prefix selecting the lite JSON grammar.
pub const JSON_PATH_PREFIX: &str = "$.";

/// Maximum number of characters of a body included in failure logs.
pub const BODY_PREVIEW_CHARS: usize = 200;

/// A parsed extraction expression.
#[derive(Debug, Clone)]
pub enum TokenPath {
    /// Textual scan for a top-level JSON key.
    JsonLite {
        /// The configured expression.
        raw: String,
        /// First segment after `$.`.
        key: String,
    },
    /// Regular expression; an invalid pattern is kept and reported on use.
    Regex {
        raw: String,
        compiled: std::result::Result<Regex, regex::Error>,
    },
}

impl TokenPath {
    /// Parses an extraction expression.
    ///
    /// An invalid regex is accepted here and reported by [`Self::extract`].
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or a JSON path has no key.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(BindError::EmptyField("token_path"));
        }
        if let Some(rest) = raw.strip_prefix(JSON_PATH_PREFIX) {
            let key = rest.split('.').next().unwrap_or_default();
            if key.is_empty() {
                return Err(BindError::Config(format!(
                    "JSON token path '{raw}' has no key"
                )));
            }
            return Ok(Self::JsonLite {
                raw: raw.to_string(),
                key: key.to_string(),
            });
        }
        Ok(Self::Regex {
            raw: raw.to_string(),
            compiled: Regex::new(raw),
        })
    }

    /// The expression as configured.
    pub fn as_str(&self) -> &str {
        match self {
            Self::JsonLite { raw, .. } | Self::Regex { raw, .. } => raw,
        }
    }

    pub const fn grammar(&self) -> &'static str {
        match self {
            Self::JsonLite { .. } => "json",
            Self::Regex { .. } => "regex",
        }
    }

    /// Pulls a non-empty token out of a body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is empty, the regex is invalid, or
    /// nothing matched.
    pub fn extract(&self, body: &str) -> std::result::Result<String, ExtractError> {
        if body.is_empty() {
            return Err(ExtractError::EmptyBody);
        }
        let found = match self {
            Self::JsonLite { key, .. } => scan_json_lite(body, key),
            Self::Regex { raw, compiled } => {
                let re = compiled.as_ref().map_err(|e| ExtractError::InvalidPattern {
                    pattern: raw.clone(),
                    reason: e.to_string(),
                })?;
                extract_regex(re, body)
            }
        };
        found.ok_or_else(|| ExtractError::NotFound {
            path: self.as_str().to_string(),
        })
    }
}

/// Extracts a token, returning `None` on any failure.
///
/// ```
/// use tokenbind::extract::extract;
///
/// let body = r#"{"data":{"token":"x"},"token":"y"}"#;
/// assert_eq!(extract(body, "$.token"), Some("y".to_string()));
/// assert_eq!(extract(body, r#""token":"(\w+)""#), Some("x".to_string()));
/// assert_eq!(extract(body, "$.missing"), None);
/// ```
pub fn extract(body: &str, path: &str) -> Option<String> {
    let token_path = TokenPath::parse(path).ok()?;
    match token_path.extract(body) {
        Ok(token) => Some(token),
        Err(err @ ExtractError::InvalidPattern { .. }) => {
            warn!(error = %err, "Token extraction failed");
            None
        }
        Err(_) => None,
    }
}

/// Returns at most the first [`BODY_PREVIEW_CHARS`] characters of a body.
pub fn body_preview(body: &str) -> &str {
    body.char_indices()
        .nth(BODY_PREVIEW_CHARS)
        .map_or(body, |(idx, _)| &body[..idx])
}

fn extract_regex(re: &Regex, body: &str) -> Option<String> {
    let caps = re.captures(body)?;
    let matched = if re.captures_len() > 1 {
        caps.get(1)
    } else {
        caps.get(0)
    };
    matched
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug)]
struct Candidate {
    depth: usize,
    quoted: bool,
    value: String,
}

impl Candidate {
    const fn beats(&self, other: &Self) -> bool {
        self.depth < other.depth || (self.depth == other.depth && self.quoted && !other.quoted)
    }
}

/// Textual scan for `"key": value` pairs, tracking only string and bracket
/// nesting so that the shallowest occurrence can be chosen.
fn scan_json_lite(body: &str, key: &str) -> Option<String> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut best: Option<Candidate> = None;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'"' => {
                let start = i + 1;
                let end = string_end(bytes, start);
                i = end.saturating_add(1);

                let colon = skip_whitespace(bytes, i);
                if bytes.get(colon) != Some(&b':') || &body[start..end] != key {
                    continue;
                }
                let value_at = skip_whitespace(bytes, colon + 1);
                if let Some(candidate) = read_value(body, value_at, depth)
                    && best.as_ref().is_none_or(|b| candidate.beats(b))
                {
                    best = Some(candidate);
                }
            }
            _ => i += 1,
        }
    }

    best.map(|c| c.value)
}

/// Index of the closing quote of a string starting at `i`, honouring escapes,
/// or the body length if it is unterminated.
fn string_end(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Reads a quoted value up to the next quote, or a bare value up to the next
/// comma, closing brace or whitespace.
fn read_value(body: &str, at: usize, depth: usize) -> Option<Candidate> {
    let bytes = body.as_bytes();
    let first = *bytes.get(at)?;

    let (quoted, value) = if first == b'"' {
        let start = at + 1;
        let len = bytes.get(start..)?.iter().position(|&b| b == b'"')?;
        (true, &body[start..start + len])
    } else {
        let len = bytes[at..]
            .iter()
            .position(|&b| b == b',' || b == b'}' || b.is_ascii_whitespace())
            .unwrap_or(bytes.len() - at);
        (false, &body[at..at + len])
    };

    if value.is_empty() {
        return None;
    }
    Some(Candidate {
        depth,
        quoted,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn json(path: &str, body: &str) -> Option<String> {
        TokenPath::parse(path).unwrap().extract(body).ok()
    }

    #[test]
    fn test_grammar_selection() {
        assert_eq!(TokenPath::parse("$.token").unwrap().grammar(), "json");
        assert_eq!(TokenPath::parse("token=(\\w+)").unwrap().grammar(), "regex");
        // `$` alone is a regex anchor, not a JSON path
        assert_eq!(TokenPath::parse("$token").unwrap().grammar(), "regex");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(TokenPath::parse("").unwrap_err().is_config_error());
        assert!(TokenPath::parse("$.").unwrap_err().is_config_error());
    }

    #[test]
    fn test_json_quoted_value() {
        assert_eq!(json("$.token", r#"{"token":"abc"}"#), Some("abc".to_string()));
        assert_eq!(
            json("$.access_token", "{\n  \"access_token\" :  \"eyJ.a.b\"\n}"),
            Some("eyJ.a.b".to_string())
        );
    }

    #[test]
    fn test_json_bare_value() {
        assert_eq!(json("$.id", r#"{"id": 12345, "ok": true}"#), Some("12345".to_string()));
        assert_eq!(json("$.ok", r#"{"id": 12345, "ok": true}"#), Some("true".to_string()));
        assert_eq!(json("$.ok", "{\"ok\":true\n}"), Some("true".to_string()));
    }

    #[test]
    fn test_json_only_first_segment_used() {
        let body = r#"{"data":{"token":"inner"},"token":"outer"}"#;
        assert_eq!(json("$.token.value", body), Some("outer".to_string()));
        // `$.data.token` reads as `$.data`; the object is taken up to its first `,` or `}`
        assert_eq!(json("$.data.token", body), Some(r#"{"token":"inner""#.to_string()));
    }

    #[test]
    fn test_json_top_level_beats_nested() {
        let body = r#"{"data":{"token":"x"},"token":"y"}"#;
        assert_eq!(json("$.token", body), Some("y".to_string()));
    }

    #[test]
    fn test_json_nested_only_is_still_found() {
        let body = r#"{"data":{"token":"x"}}"#;
        assert_eq!(json("$.token", body), Some("x".to_string()));
    }

    #[test]
    fn test_json_quoted_beats_bare_at_same_depth() {
        let body = r#"{"token": null, "token": "later"}"#;
        assert_eq!(json("$.token", body), Some("later".to_string()));
    }

    #[test]
    fn test_json_tolerates_partial_body() {
        assert_eq!(json("$.token", r#""token": "abc", "exp""#), Some("abc".to_string()));
        assert_eq!(json("$.token", r#"{"token":"abc","user":{"na"#), Some("abc".to_string()));
        assert_eq!(json("$.token", r#"[{"token":"in-array"}]"#), Some("in-array".to_string()));
    }

    #[test]
    fn test_json_ignores_values_named_like_key() {
        let body = r#"{"kind":"token","token":"real"}"#;
        assert_eq!(json("$.token", body), Some("real".to_string()));
    }

    #[test]
    fn test_json_empty_or_missing() {
        assert_eq!(json("$.token", r#"{"token":""}"#), None);
        assert_eq!(json("$.token", r#"{"other":"x"}"#), None);
        assert_eq!(json("$.token", r#"{"token":"unterminated"#), None);
    }

    #[test]
    fn test_regex_first_group() {
        let body = r#"{"token":"abc123"}"#;
        assert_eq!(
            json(r#""token"\s*:\s*"(\w+)""#, body),
            Some("abc123".to_string())
        );
        assert_eq!(json(r"token=(\w+)", "session token=abc123; path=/"), Some("abc123".to_string()));
    }

    #[test]
    fn test_regex_whole_match_without_group() {
        let body = r#"{"token":"abc123"}"#;
        assert_eq!(json(r"abc\d+", body), Some("abc123".to_string()));
    }

    #[test]
    fn test_regex_unmatched_optional_group() {
        assert_eq!(json(r"token(=(\w+))?", "token"), None);
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let path = TokenPath::parse("token=(\\w+").unwrap();
        let err = path.extract("token=abc").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPattern { .. }));
        assert_eq!(extract("token=abc", "token=(\\w+"), None);
    }

    #[test]
    fn test_empty_body() {
        let path = TokenPath::parse("$.token").unwrap();
        assert_eq!(path.extract(""), Err(ExtractError::EmptyBody));
    }

    #[test]
    fn test_body_preview_truncates_on_char_boundary() {
        let body = "é".repeat(300);
        assert_eq!(body_preview(&body).chars().count(), BODY_PREVIEW_CHARS);
        assert_eq!(body_preview("short"), "short");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fuzz_json_lite_never_panics(body in ".*", key in "[a-z_]{1,8}") {
            let _ = scan_json_lite(&body, &key);
        }

        #[test]
        fn fuzz_json_lite_finds_top_level_string(
            key in "[a-z_]{1,8}",
            value in "[A-Za-z0-9._-]{1,40}",
            noise in "[a-z]{0,10}",
        ) {
            let body = format!(r#"{{"nested":{{"{key}":"decoy"}},"{noise}x":1,"{key}":"{value}"}}"#);
            prop_assert_eq!(scan_json_lite(&body, &key), Some(value));
        }

        #[test]
        fn fuzz_regex_extract_never_panics(body in ".*", pattern in ".*") {
            let _ = extract(&body, &pattern);
        }
    }
}
