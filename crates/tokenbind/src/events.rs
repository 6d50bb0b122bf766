//! Event types emitted by the binder
//!
//! Events are **observability**: fire-and-forget notifications about what the
//! pipeline did with a piece of traffic. Nothing in the pipeline waits on an
//! event to make a decision, and no event can stop a request from being
//! forwarded.
//!
//! Callbacks run synchronously on the thread that produced the event and must
//! not block. Token values in events are always masked.

use tokenbind_common::{AddressingMode, InjectionLocation};

use crate::autofetch::RefreshOutcome;

/// Events emitted by `TokenBinder` while classifying traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinderEvent {
    /// A token was extracted from a source response and stored
    TokenExtracted {
        /// URL of the request that produced the response
        url: String,
        /// Masked token value
        masked: String,
    },

    /// An eligible response did not yield a token
    ExtractionFailed {
        url: String,
        /// Why nothing was extracted
        reason: String,
        /// First characters of the response body
        body_preview: String,
    },

    /// A target request was rewritten with the current token
    TokenInjected {
        url: String,
        location: InjectionLocation,
        masked: String,
    },

    /// A target request was forwarded unmodified because injection failed
    InjectionFailed { url: String, reason: String },

    /// An auto-fetch attempt finished, or gave up waiting
    Refreshed(RefreshOutcome),

    /// The stored token was cleared
    TokenCleared,

    /// A new binding replaced the previous one
    ConfigApplied(AddressingMode),
}

/// Callback for receiving binder events
///
/// Returns `()` because events are notifications, not control flow decisions.
pub type EventCallback = Box<dyn Fn(&BinderEvent) + Send + Sync>;
