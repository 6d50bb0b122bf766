//! Replaying the source flow before a target request is forwarded.
//!
//! The replay runs as a spawned task. The request path awaits its handle for
//! at most the configured timeout and then moves on with whatever token is
//! stored. A replay that outlives the wait keeps running and may still commit
//! its token, unless the binding was replaced or the binder shut down in the
//! meantime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokenbind_common::{HttpRequest, ToolSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::classifier::Binding;
use crate::config::BinderSettings;
use crate::events::{BinderEvent, EventCallback};
use crate::extract::body_preview;
use crate::state::{BinderState, SharedState};
use crate::store::mask_token;
use crate::surface::InterceptionSurface;

/// How an auto-fetch attempt ended. None of these stop the target request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RefreshOutcome {
    /// A new token was extracted and stored.
    Refreshed {
        /// Masked token value
        masked: String,
    },
    /// The stored token is inside the reuse window; nothing was sent.
    Fresh,
    /// No binding has been applied.
    NotConfigured,
    /// No source request has been seen or seeded yet.
    NoTemplate,
    /// The replay response did not yield a token.
    NoToken { reason: String },
    /// The surface could not send the replay.
    SendFailed(String),
    /// The replay did not finish within the wait bound.
    TimedOut,
    /// The binding was replaced or the binder shut down.
    Cancelled,
}

impl RefreshOutcome {
    pub const fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refreshed { masked } => write!(f, "refreshed ({masked})"),
            Self::Fresh => write!(f, "stored token still fresh"),
            Self::NotConfigured => write!(f, "no binding applied"),
            Self::NoTemplate => write!(f, "no source request to replay"),
            Self::NoToken { reason } => write!(f, "no token in replay response: {reason}"),
            Self::SendFailed(reason) => write!(f, "replay failed: {reason}"),
            Self::TimedOut => write!(f, "replay timed out"),
            Self::Cancelled => write!(f, "replay cancelled"),
        }
    }
}

/// A replay resolved against one state snapshot.
#[derive(Debug)]
pub(crate) struct RefreshPlan {
    binding: Arc<Binding>,
    replay: HttpRequest,
    generation: u64,
    cancel: CancellationToken,
}

impl RefreshPlan {
    /// Resolves what to replay, or why nothing should be.
    pub(crate) fn resolve(
        state: &BinderState,
        settings: &BinderSettings,
    ) -> Result<Self, RefreshOutcome> {
        let binding = state.binding.clone().ok_or(RefreshOutcome::NotConfigured)?;
        let template = state.replay_template().ok_or(RefreshOutcome::NoTemplate)?;

        if let (Some(window), Some(current)) = (settings.token_reuse_window(), state.store.state())
            && current.is_fresh(window)
        {
            return Err(RefreshOutcome::Fresh);
        }

        Ok(Self {
            binding,
            replay: template.clone().with_tool_source(ToolSource::Extension),
            generation: state.generation,
            cancel: state.cancel.clone(),
        })
    }
}

/// Handles a replay needs once it is detached from the request path.
pub(crate) struct RefreshTask<S> {
    pub(crate) surface: Arc<S>,
    pub(crate) state: SharedState,
    pub(crate) events: Option<Arc<EventCallback>>,
}

impl<S: InterceptionSurface + 'static> RefreshTask<S> {
    /// Spawns the replay and waits for it for at most `timeout`.
    #[instrument(skip_all, fields(url = %plan.replay.url, generation = plan.generation))]
    pub(crate) async fn run(self, plan: RefreshPlan, timeout: Duration) -> RefreshOutcome {
        debug!("Replaying source request");
        let handle = tokio::spawn(self.replay(plan));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => RefreshOutcome::SendFailed(format!("Refresh task failed: {e}")),
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Auto-fetch timed out, continuing with stored token"
                );
                RefreshOutcome::TimedOut
            }
        }
    }

    async fn replay(self, plan: RefreshPlan) -> RefreshOutcome {
        let RefreshPlan {
            binding,
            replay,
            generation,
            cancel,
        } = plan;
        let url = replay.url.clone();

        let result = tokio::select! {
            () = cancel.cancelled() => return RefreshOutcome::Cancelled,
            result = self.surface.send(replay) => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Auto-fetch replay failed");
                return RefreshOutcome::SendFailed(e.to_string());
            }
        };

        let token = match binding.token_path().extract(&response.body) {
            Ok(token) => token,
            Err(e) => {
                warn!(
                    url = %url,
                    status = response.status,
                    error = %e,
                    body_preview = %body_preview(&response.body),
                    "Replay response carried no token"
                );
                return RefreshOutcome::NoToken {
                    reason: e.to_string(),
                };
            }
        };

        let masked = mask_token(&token);
        {
            let mut state = self.state.write();
            if cancel.is_cancelled() || state.generation != generation {
                debug!(url = %url, "Discarding token from superseded replay");
                return RefreshOutcome::Cancelled;
            }
            state.store.set(token);
        }

        info!(url = %url, token = %masked, "Token refreshed");
        if let Some(callback) = &self.events {
            callback(&BinderEvent::TokenExtracted {
                url,
                masked: masked.clone(),
            });
        }
        RefreshOutcome::Refreshed { masked }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use tokenbind_common::{AddressingMode, BindingConfig, InjectionLocation, TokenFormat};

    fn binding() -> Arc<Binding> {
        Arc::new(
            Binding::compile(BindingConfig {
                mode: AddressingMode::Pattern {
                    source: "auth.test/login".to_string(),
                    targets: vec!["api.test/*".to_string()],
                },
                token_path: "$.token".to_string(),
                injection_location: InjectionLocation::Header,
                injection_key: "Authorization".to_string(),
                token_format: TokenFormat::default(),
                auto_fetch_enabled: true,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_resolve_requires_binding_and_template() {
        let mut state = BinderState::new(CancellationToken::new());
        let settings = BinderSettings::default();

        assert_eq!(
            RefreshPlan::resolve(&state, &settings).unwrap_err(),
            RefreshOutcome::NotConfigured
        );

        state.binding = Some(binding());
        assert_eq!(
            RefreshPlan::resolve(&state, &settings).unwrap_err(),
            RefreshOutcome::NoTemplate
        );

        state.seeded_template = Some(HttpRequest::new("POST", "https://auth.test/login"));
        let plan = RefreshPlan::resolve(&state, &settings).unwrap();
        assert_eq!(plan.replay.tool_source, ToolSource::Extension);
    }

    #[test]
    fn test_resolve_prefers_captured_template() {
        let mut state = BinderState::new(CancellationToken::new());
        state.binding = Some(binding());
        state.seeded_template = Some(HttpRequest::new("POST", "https://auth.test/seeded"));
        state.captured_template = Some(HttpRequest::new("POST", "https://auth.test/login"));

        let plan = RefreshPlan::resolve(&state, &BinderSettings::default()).unwrap();
        assert_eq!(plan.replay.url, "https://auth.test/login");
    }

    #[test]
    fn test_resolve_honors_reuse_window() {
        let mut state = BinderState::new(CancellationToken::new());
        state.binding = Some(binding());
        state.captured_template = Some(HttpRequest::new("POST", "https://auth.test/login"));
        state.store.set("abc");

        let always = BinderSettings::default();
        assert!(RefreshPlan::resolve(&state, &always).is_ok());

        let windowed = BinderSettings {
            token_reuse_window_ms: Some(60_000),
            ..BinderSettings::default()
        };
        assert_eq!(
            RefreshPlan::resolve(&state, &windowed).unwrap_err(),
            RefreshOutcome::Fresh
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RefreshOutcome::TimedOut.to_string(), "replay timed out");
        assert!(
            RefreshOutcome::Refreshed {
                masked: "x".to_string()
            }
            .is_refreshed()
        );
        assert!(!RefreshOutcome::Fresh.is_refreshed());
    }
}
