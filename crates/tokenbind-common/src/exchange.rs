//! HTTP request/response values exchanged with the interception surface.
//!
//! These are plain owned values: every `with_*` method consumes the value and
//! returns a new one, so an intercepted request is never mutated in place and
//! the caller can always fall back to the original.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Identifies the tool of the host surface that produced a piece of traffic.
///
/// Only traffic from the addressed tool (usually [`ToolSource::Repeater`]) is
/// classified; everything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ToolSource {
    /// The interactive request editor/replayer.
    #[default]
    Repeater,
    /// Live browser traffic passing through the intercepting proxy.
    Proxy,
    /// Automated payload runs.
    Intruder,
    /// Active or passive scanning.
    Scanner,
    /// Requests issued programmatically by an extension, including replays.
    Extension,
    /// Any other tool, by name.
    Other(String),
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repeater => write!(f, "repeater"),
            Self::Proxy => write!(f, "proxy"),
            Self::Intruder => write!(f, "intruder"),
            Self::Scanner => write!(f, "scanner"),
            Self::Extension => write!(f, "extension"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ToolSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            anyhow::bail!("Tool source name must not be empty");
        }
        Ok(match name.to_ascii_lowercase().as_str() {
            "repeater" => Self::Repeater,
            "proxy" => Self::Proxy,
            "intruder" => Self::Intruder,
            "scanner" => Self::Scanner,
            "extension" | "extensions" => Self::Extension,
            other => Self::Other(other.to_string()),
        })
    }
}

/// Opaque identifier of an editor flow (for example a repeater tab number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u32>()
            .map(Self)
            .map_err(|e| anyhow::anyhow!("Invalid flow id '{trimmed}': {e}"))
    }
}

impl From<u32> for FlowId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// A single HTTP header. Order and duplicates are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Header names compare case-insensitively.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// An HTTP request as seen by the interception surface.
///
/// Retained verbatim when captured as a source template, so that a replay
/// re-issues the exact method, headers and body.
///
/// # Examples
///
/// ```
/// use tokenbind_common::{HttpRequest, ToolSource};
///
/// let request = HttpRequest::builder()
///     .method("POST")
///     .url("https://api.example.com/login")
///     .body(r#"{"user":"alice"}"#)
///     .build()
///     .with_added_header("Content-Type", "application/json");
///
/// assert_eq!(request.header("content-type"), Some("application/json"));
/// assert_eq!(request.tool_source, ToolSource::Repeater);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct HttpRequest {
    /// HTTP method, e.g. `GET`.
    #[builder(default = "GET".to_string(), setter(into))]
    pub method: String,

    /// Absolute request URL including any query string.
    #[builder(setter(into))]
    pub url: String,

    /// Headers in wire order.
    #[builder(default)]
    #[serde(default)]
    pub headers: Vec<Header>,

    /// Request body as text; empty when the request has no body.
    #[builder(default, setter(into))]
    #[serde(default)]
    pub body: String,

    /// Editor flow that issued the request, when the surface reports one.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<FlowId>,

    /// Tool that produced the request.
    #[builder(default)]
    #[serde(default)]
    pub tool_source: ToolSource,
}

impl HttpRequest {
    /// Creates a body-less request from the default tool.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: String::new(),
            flow_id: None,
            tool_source: ToolSource::default(),
        }
    }

    /// Returns the value of the first header with this name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is_named(name))
            .map(|h| h.value.as_str())
    }

    /// Returns all headers with this name, ignoring case.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Header> + 'a {
        self.headers.iter().filter(move |h| h.is_named(name))
    }

    /// Removes every header with this name, ignoring case.
    #[must_use]
    pub fn with_removed_header(mut self, name: &str) -> Self {
        self.headers.retain(|h| !h.is_named(name));
        self
    }

    /// Appends a header, keeping any existing ones with the same name.
    #[must_use]
    pub fn with_added_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn with_flow_id(mut self, flow_id: FlowId) -> Self {
        self.flow_id = Some(flow_id);
        self
    }

    #[must_use]
    pub fn with_tool_source(mut self, tool_source: ToolSource) -> Self {
        self.tool_source = tool_source;
        self
    }

    /// Appends a URL query parameter, form-encoding both name and value.
    ///
    /// The rest of the URL text is left byte-for-byte as written: dot
    /// segments, explicit default ports and host case survive. Existing
    /// parameters, including ones with the same name, are kept as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the request URL is not an absolute URL.
    pub fn with_added_query_param(mut self, name: &str, value: &str) -> Result<Self, url::ParseError> {
        url::Url::parse(&self.url)?;

        let (base, fragment) = match self.url.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (self.url.as_str(), None),
        };
        let separator = match base.split_once('?') {
            None => "?",
            Some((_, query)) if query.is_empty() || query.ends_with('&') => "",
            Some(_) => "&",
        };
        let pair = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(name, value)
            .finish();

        let mut rewritten = format!("{base}{separator}{pair}");
        if let Some(fragment) = fragment {
            rewritten.push('#');
            rewritten.push_str(fragment);
        }
        self.url = rewritten;
        Ok(self)
    }

    /// Returns the value of the first query parameter with this name.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// An HTTP response together with the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct HttpResponse {
    /// Status code, e.g. `200`.
    #[builder(default = 200)]
    pub status: u16,

    #[builder(default)]
    #[serde(default)]
    pub headers: Vec<Header>,

    /// Response body as text.
    #[builder(default, setter(into))]
    #[serde(default)]
    pub body: String,

    /// The request this response answers.
    pub initiating_request: HttpRequest,
}

impl HttpResponse {
    /// URL of the initiating request.
    pub fn url(&self) -> &str {
        &self.initiating_request.url
    }

    /// Tool that issued the initiating request.
    pub const fn tool_source(&self) -> &ToolSource {
        &self.initiating_request.tool_source
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is_named(name))
            .map(|h| h.value.as_str())
    }
}
