//! The seam between the binder and the host traffic-interception surface.
//!
//! The surface calls into the binder once per outgoing request and once per
//! incoming response. In the other direction the binder only needs one thing
//! from the surface: the ability to send a request of its own and await the
//! response, which is what auto-fetch uses to replay the source flow.

use async_trait::async_trait;
use tokenbind_common::{HttpRequest, HttpResponse};

use crate::error::SendError;

/// Send capability of an interception surface.
///
/// Implementations must be usable concurrently from the request path and from
/// spawned refresh tasks.
#[async_trait]
pub trait InterceptionSurface: Send + Sync {
    /// Issues `request` and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be delivered or produced no
    /// response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SendError>;
}

#[async_trait]
impl<T: InterceptionSurface + ?Sized> InterceptionSurface for std::sync::Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SendError> {
        (**self).send(request).await
    }
}

/// Decision returned for an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Forward the request as it was intercepted.
    ForwardUnmodified,
    /// Forward this request in place of the intercepted one.
    ForwardReplacement(HttpRequest),
}

impl RequestAction {
    /// Resolves the action against the intercepted request.
    pub fn into_request(self, original: HttpRequest) -> HttpRequest {
        match self {
            Self::ForwardUnmodified => original,
            Self::ForwardReplacement(replacement) => replacement,
        }
    }

    pub const fn is_replacement(&self) -> bool {
        matches!(self, Self::ForwardReplacement(_))
    }
}

/// Decision returned for an incoming response. Responses are never held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseAction {
    #[default]
    Continue,
}
