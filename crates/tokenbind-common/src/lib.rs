//! # tokenbind-common
//!
//! Common types shared by the tokenbind crates.
//!
//! This crate provides the plain data model of the binder:
//! - HTTP request/response values as delivered by an interception surface
//! - Binding configuration: addressing mode, injection location, token format
//!
//! ## Example
//!
//! ```
//! use tokenbind_common::{AddressingMode, BindingConfig, InjectionLocation, TokenFormat};
//!
//! let config = BindingConfig {
//!     mode: AddressingMode::Pattern {
//!         source: "auth.example.com/login".to_string(),
//!         targets: vec!["api.example.com/v1/*".to_string()],
//!     },
//!     token_path: "$.access_token".to_string(),
//!     injection_location: InjectionLocation::Header,
//!     injection_key: "Authorization".to_string(),
//!     token_format: TokenFormat::default(),
//!     auto_fetch_enabled: true,
//! };
//!
//! assert_eq!(config.token_format.render("abc"), "Bearer abc");
//! ```

/// Binding configuration types.
///
/// Addressing modes, injection locations and token formats.
pub mod binding;
/// HTTP exchange types.
///
/// Requests, responses, headers and the tool/flow metadata attached to them.
pub mod exchange;

pub use binding::{
    AddressingMode, BindingConfig, DEFAULT_TOKEN_FORMAT, InjectionLocation, TOKEN_PLACEHOLDER,
    TokenFormat,
};
pub use exchange::{FlowId, Header, HttpRequest, HttpResponse, ToolSource};
