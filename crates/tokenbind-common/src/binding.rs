//! Binding configuration: which flow produces the token, which flows consume
//! it, and how the token is written into a consuming request.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::exchange::FlowId;

/// Placeholder substituted by the token in a [`TokenFormat`].
pub const TOKEN_PLACEHOLDER: &str = "{token}";

/// Format used when none is configured.
pub const DEFAULT_TOKEN_FORMAT: &str = "Bearer {token}";

/// How source and target roles are decided.
///
/// Switching modes replaces the whole variant, so matchers from the previous
/// mode can never linger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AddressingMode {
    /// Roles decided by URL pattern.
    Pattern {
        /// Pattern matched against the URL of a response's initiating request.
        source: String,
        /// Patterns matched against outgoing request URLs.
        targets: Vec<String>,
    },
    /// Roles decided by opaque editor flow identifiers.
    FlowId {
        source: FlowId,
        targets: Vec<FlowId>,
    },
}

impl AddressingMode {
    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pattern { .. } => "pattern",
            Self::FlowId { .. } => "flow_id",
        }
    }

    pub const fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern { .. })
    }

    pub const fn is_flow_id(&self) -> bool {
        matches!(self, Self::FlowId { .. })
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern { source, targets } => {
                write!(f, "pattern(source={source}, targets=[{}])", targets.join(", "))
            }
            Self::FlowId { source, targets } => {
                let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
                write!(f, "flow_id(source={source}, targets=[{}])", targets.join(", "))
            }
        }
    }
}

/// Where the token is written in a target request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InjectionLocation {
    /// Replace the named header.
    #[default]
    Header,
    /// Append a URL query parameter.
    QueryParam,
    /// Append a member to a bare JSON object body.
    BodyJson,
    /// Append a form-encoded field to the body.
    BodyForm,
}

impl fmt::Display for InjectionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::QueryParam => write!(f, "query_param"),
            Self::BodyJson => write!(f, "body_json"),
            Self::BodyForm => write!(f, "body_form"),
        }
    }
}

impl FromStr for InjectionLocation {
    type Err = anyhow::Error;

    /// Accepts the short names, their aliases, and the settings panel labels,
    /// ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(Self::Header),
            "query" | "query_param" | "query parameter" => Ok(Self::QueryParam),
            "body_json" | "json" | "body (json)" => Ok(Self::BodyJson),
            "body_form" | "form" | "body (form)" => Ok(Self::BodyForm),
            _ => anyhow::bail!("Unknown injection location: {s}"),
        }
    }
}

/// Template that renders a token, e.g. `Bearer {token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenFormat(String);

impl TokenFormat {
    /// Creates a format; a blank template falls back to [`DEFAULT_TOKEN_FORMAT`].
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        if template.trim().is_empty() {
            return Self::default();
        }
        if !template.contains(TOKEN_PLACEHOLDER) {
            warn!("Token format '{template}' has no {TOKEN_PLACEHOLDER} placeholder");
        }
        Self(template)
    }

    /// Substitutes every placeholder occurrence with the token.
    ///
    /// ```
    /// use tokenbind_common::TokenFormat;
    ///
    /// assert_eq!(TokenFormat::default().render("abc"), "Bearer abc");
    /// assert_eq!(TokenFormat::new("{token}").render("abc"), "abc");
    /// ```
    pub fn render(&self, token: &str) -> String {
        self.0.replace(TOKEN_PLACEHOLDER, token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the template references the token at all.
    pub fn has_placeholder(&self) -> bool {
        self.0.contains(TOKEN_PLACEHOLDER)
    }
}

impl Default for TokenFormat {
    fn default() -> Self {
        Self(DEFAULT_TOKEN_FORMAT.to_string())
    }
}

impl fmt::Display for TokenFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable snapshot of an applied binding.
///
/// Produced by an apply call and replaced wholesale by the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Active addressing mode with its matchers.
    pub mode: AddressingMode,
    /// Extraction expression; `$.`-prefixed paths are lite JSON, anything else a regex.
    pub token_path: String,
    pub injection_location: InjectionLocation,
    /// Header, parameter or field name at the injection site.
    pub injection_key: String,
    #[serde(default)]
    pub token_format: TokenFormat,
    /// Whether target requests trigger a replay of the source flow first.
    #[serde(default = "default_auto_fetch")]
    pub auto_fetch_enabled: bool,
}

const fn default_auto_fetch() -> bool {
    true
}

impl BindingConfig {
    /// Returns a copy with a different auto-fetch flag.
    #[must_use]
    pub fn with_auto_fetch(mut self, enabled: bool) -> Self {
        self.auto_fetch_enabled = enabled;
        self
    }
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
///
/// ```
/// use tokenbind_common::binding::split_csv;
///
/// assert_eq!(split_csv(" a, ,b ,"), vec!["a", "b"]);
/// ```
pub fn split_csv(input: &str) -> Vec<&str> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_location_aliases() {
        let cases = [
            ("header", InjectionLocation::Header),
            ("HEADER", InjectionLocation::Header),
            ("query", InjectionLocation::QueryParam),
            ("query_param", InjectionLocation::QueryParam),
            ("Query Parameter", InjectionLocation::QueryParam),
            ("json", InjectionLocation::BodyJson),
            ("Body (JSON)", InjectionLocation::BodyJson),
            ("form", InjectionLocation::BodyForm),
            ("body_form", InjectionLocation::BodyForm),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<InjectionLocation>().unwrap(), expected, "{input}");
        }
        assert!("cookie".parse::<InjectionLocation>().is_err());
    }

    #[test]
    fn test_location_display_round_trips() {
        for location in [
            InjectionLocation::Header,
            InjectionLocation::QueryParam,
            InjectionLocation::BodyJson,
            InjectionLocation::BodyForm,
        ] {
            assert_eq!(location.to_string().parse::<InjectionLocation>().unwrap(), location);
        }
    }

    #[test]
    fn test_token_format_blank_falls_back() {
        assert_eq!(TokenFormat::new("   ").as_str(), DEFAULT_TOKEN_FORMAT);
        assert_eq!(TokenFormat::new("Token {token}").render("t"), "Token t");
        assert_eq!(TokenFormat::new("{token}:{token}").render("t"), "t:t");
        assert!(!TokenFormat::new("static").has_placeholder());
    }

    #[test]
    fn test_mode_display() {
        let mode = AddressingMode::FlowId {
            source: FlowId(1),
            targets: vec![FlowId(2), FlowId(3)],
        };
        assert_eq!(mode.to_string(), "flow_id(source=1, targets=[2, 3])");
        assert!(mode.is_flow_id());
        assert_eq!(mode.name(), "flow_id");
    }

    #[test]
    fn test_binding_config_serde_defaults() {
        let config: BindingConfig = serde_json::from_str(
            r#"{
                "mode": {"mode": "pattern", "source": "/login", "targets": ["/api/*"]},
                "token_path": "$.token",
                "injection_location": "header",
                "injection_key": "Authorization"
            }"#,
        )
        .unwrap();

        assert!(config.auto_fetch_enabled);
        assert_eq!(config.token_format, TokenFormat::default());
        assert!(config.mode.is_pattern());
    }
}

#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fuzz_split_csv_entries_are_trimmed_and_non_empty(input in ".*") {
            for entry in split_csv(&input) {
                prop_assert!(!entry.is_empty());
                prop_assert_eq!(entry, entry.trim());
                prop_assert!(!entry.contains(','));
            }
        }

        #[test]
        fn fuzz_render_without_placeholder_is_identity(template in "[^{}]*", token in ".*") {
            let format = TokenFormat::new(template.clone());
            if !template.trim().is_empty() {
                prop_assert_eq!(format.render(&token), template);
            }
        }
    }
}
