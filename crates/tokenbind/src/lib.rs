//! # tokenbind
//!
//! Keeps token-consuming HTTP requests supplied with a fresh token taken from
//! a token-producing request, inside an interactive request-replay tool.
//!
//! A *source* flow yields a token in its response body. *Target* flows get
//! that token injected before they are sent. With auto-fetch enabled, every
//! target request first replays the last source request so the token it
//! carries is as fresh as possible.
//!
//! ## Quick Start
//!
//! ```rust
//! use tokenbind::extract::extract;
//! use tokenbind::inject::inject;
//! use tokenbind::matcher::matches;
//! use tokenbind::{HttpRequest, InjectionLocation, TokenFormat};
//!
//! let body = r#"{"access_token":"abc123","expires_in":3600}"#;
//! let token = extract(body, "$.access_token").unwrap_or_default();
//!
//! let request = HttpRequest::new("GET", "https://api.example.com/v1/users");
//! assert!(matches(&request.url, "api.example.com/v1/*"));
//!
//! let request = inject(&request, &token, InjectionLocation::Header, "Authorization", &TokenFormat::default())?;
//! assert_eq!(request.header("authorization"), Some("Bearer abc123"));
//! # Ok::<(), tokenbind::error::InjectError>(())
//! ```
//!
//! ## Components
//!
//! - **Pattern matching** ([`matcher`]): glob and substring URL matching
//! - **Extraction** ([`extract`]): lite JSON path or regex over a response body
//! - **Token store** ([`store`]): the single current token and its fetch time
//! - **Injection** ([`inject`]): header, query parameter, JSON body or form body
//! - **Classification** ([`classifier`]): source and target roles per addressing mode
//! - **Auto-fetch** ([`autofetch`]): bounded replay of the source request
//! - **Binder** ([`TokenBinder`]): the facade an interception surface calls into

pub mod autofetch;
pub mod binder;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod inject;
pub mod matcher;
mod state;
pub mod store;
pub mod surface;

pub use tokenbind_common::*;

pub use autofetch::RefreshOutcome;
pub use binder::TokenBinder;
pub use config::{BinderSettings, ConfigFile};
pub use error::{BindError, ExtractError, InjectError, Result, SendError};
pub use events::{BinderEvent, EventCallback};
pub use store::{TokenStatus, mask_token};
pub use surface::{InterceptionSurface, RequestAction, ResponseAction};
