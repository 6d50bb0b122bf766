//! Error types for the client library.

use thiserror::Error;

/// Errors that can occur when replaying a request over the network.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP request failure.
    ///
    /// Indicates issues like DNS resolution, connection failures, or socket errors.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Middleware layer error.
    ///
    /// Errors from the retry middleware, including the last underlying failure.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// Client configuration issue.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request cannot be expressed on the wire.
    ///
    /// Unknown method tokens or URLs that are not absolute.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Check if this error is potentially retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::MiddlewareError(_))
    }

    /// Check if the request timed out.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::NetworkError(e) => e.is_timeout(),
            Self::MiddlewareError(reqwest_middleware::Error::Reqwest(e)) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = ClientError::InvalidRequest("bad method".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Invalid request: bad method");

        let err = ClientError::ConfigurationError("x".to_string());
        assert!(!err.is_retryable());
    }
}
