//! A send capability that replays requests with reqwest.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use tokenbind::{InterceptionSurface, SendError};
use tokenbind_common::{Header, HttpRequest, HttpResponse};

use crate::error::{ClientError, Result};

/// Headers recomputed by the HTTP stack and never copied from a template.
const HOP_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

/// Network settings for replayed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ClientSettings {
    /// Whole-request timeout; `None` waits indefinitely (default: 30)
    #[builder(default = Some(30))]
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: Option<u64>,

    /// Connection establishment timeout (default: 10)
    #[builder(default = 10)]
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// Retries for transient failures (default: 1)
    #[builder(default = 1)]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Skip TLS certificate validation, for test targets behind self-signed certs
    #[builder(default = false)]
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[allow(clippy::unnecessary_wraps)]
const fn default_timeout_seconds() -> Option<u64> {
    Some(30)
}

const fn default_connect_timeout_seconds() -> u64 {
    10
}

const fn default_max_retries() -> u32 {
    1
}

/// Replays [`HttpRequest`]s over the network.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ReqwestSurface {
    client: ClientWithMiddleware,
    settings: Arc<ClientSettings>,
}

// Templates carry credentials in headers, so only settings are shown
impl fmt::Debug for ReqwestSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestSurface")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ReqwestSurface {
    /// Creates a surface with retry middleware configured from `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(settings.max_retries);

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .danger_accept_invalid_certs(settings.accept_invalid_certs);
        if let Some(timeout) = settings.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let reqwest_client = builder
            .build()
            .map_err(|e| ClientError::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;

        let client = reqwest_middleware::ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Sends `request` as-is and collects the full response.
    ///
    /// Non-success statuses are returned as responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the method or URL is invalid, or the exchange fails.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ClientError::InvalidRequest(format!("Invalid HTTP method '{}'", request.method))
        })?;
        let url = url::Url::parse(&request.url)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid URL '{}': {e}", request.url)))?;

        let mut builder = self.client.request(method, url);
        for header in &request.headers {
            if HOP_HEADERS.iter().any(|h| header.is_named(h)) {
                continue;
            }
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        debug!("Replaying {} {}", request.method, request.url);
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Replay of {} returned status {}",
                request.url,
                status.as_u16()
            );
        }
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                Header::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse::builder()
            .status(status.as_u16())
            .headers(headers)
            .body(body)
            .initiating_request(request.clone())
            .build())
    }
}

#[async_trait]
impl InterceptionSurface for ReqwestSurface {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, SendError> {
        self.execute(&request)
            .await
            .map_err(|e| SendError::Failed(e.to_string()))
    }
}
