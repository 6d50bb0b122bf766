//! Error types for the binder.
//!
//! Only configuration errors ever reach a caller of the apply setters. The
//! other families are reported to the observability sink and the traffic is
//! forwarded anyway.

use thiserror::Error;
use tokenbind_common::InjectionLocation;

/// Errors raised by the configuration surface and config file loading.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindError {
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required field was left empty.
    #[error("Required field is empty: {0}")]
    EmptyField(&'static str),

    /// A flow identifier that is not a non-negative integer.
    #[error("Invalid flow id '{value}'")]
    InvalidFlowId {
        /// The rejected input.
        value: String,
    },

    /// I/O error while reading a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BindError {
    /// Whether the error was caused by rejected configuration input.
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::EmptyField(_) | Self::InvalidFlowId { .. }
        )
    }
}

/// Result type alias using `BindError`.
pub type Result<T> = std::result::Result<T, BindError>;

/// Why a token could not be pulled out of a response body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractError {
    /// The response had no body to scan.
    #[error("Response body is empty")]
    EmptyBody,

    /// The configured regex does not compile.
    #[error("Invalid token pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The configured expression.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// The expression matched nothing, or matched an empty value.
    #[error("No token found for path '{path}'")]
    NotFound {
        /// The configured expression.
        path: String,
    },
}

/// Why a token could not be written into a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum InjectError {
    /// The request URL cannot carry a query parameter.
    #[error("Cannot add query parameter to '{url}': {reason}")]
    InvalidUrl {
        /// The request URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The body shape does not fit the injection location.
    #[error("Body is not suitable for {location} injection: {reason}")]
    UnsupportedBody {
        location: InjectionLocation,
        reason: &'static str,
    },
}

/// Failure of the surface's send capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendError {
    /// The request could not be delivered or the exchange failed.
    #[error("Send failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_classification() {
        assert!(BindError::Config("x".to_string()).is_config_error());
        assert!(BindError::EmptyField("token_path").is_config_error());
        assert!(
            BindError::InvalidFlowId {
                value: "a".to_string()
            }
            .is_config_error()
        );
        assert!(!BindError::Io(std::io::Error::other("disk")).is_config_error());
    }

    #[test]
    fn test_error_messages() {
        let err = InjectError::UnsupportedBody {
            location: InjectionLocation::BodyJson,
            reason: "body is not a JSON object",
        };
        assert_eq!(
            err.to_string(),
            "Body is not suitable for body_json injection: body is not a JSON object"
        );
        assert_eq!(
            ExtractError::NotFound {
                path: "$.token".to_string()
            }
            .to_string(),
            "No token found for path '$.token'"
        );
    }
}
