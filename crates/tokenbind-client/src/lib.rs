//! # tokenbind-client
//!
//! Network send capability for tokenbind.
//!
//! [`ReqwestSurface`] implements [`tokenbind::InterceptionSurface`] on top of
//! `reqwest` with transient-failure retries, so a binder can replay its source
//! request outside of an interception host (for example from the CLI).
//!
//! ## Example
//!
//! ```no_run
//! use tokenbind::{HttpRequest, TokenBinder};
//! use tokenbind_client::{ClientSettings, ReqwestSurface};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let surface = ReqwestSurface::new(ClientSettings::default())?;
//! let binder = TokenBinder::new(surface);
//! binder.apply_pattern_config(
//!     "auth.example.com/token",
//!     "api.example.com/*",
//!     "$.access_token",
//!     "header",
//!     "Authorization",
//!     "Bearer {token}",
//! )?;
//! binder.set_source_request(HttpRequest::new("POST", "https://auth.example.com/token"));
//!
//! let outcome = binder.refresh().await;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod surface;

pub use error::ClientError;
pub use surface::{ClientSettings, ReqwestSurface};
