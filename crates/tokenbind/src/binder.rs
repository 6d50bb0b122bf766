//! The binder facade wired into an interception surface.
//!
//! `TokenBinder` owns the binding, the source templates and the token store,
//! and exposes the two interception callbacks plus the configuration surface
//! used by a settings panel or config loader.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokenbind_common::{BindingConfig, HttpRequest, HttpResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::autofetch::{RefreshOutcome, RefreshPlan, RefreshTask};
use crate::classifier::{Binding, RequestRole, ResponseOutcome};
use crate::config::{self, BinderSettings};
use crate::error::Result;
use crate::events::{BinderEvent, EventCallback};
use crate::extract::body_preview;
use crate::inject::inject;
use crate::state::{BinderState, SharedState};
use crate::store::{TokenStatus, mask_token};
use crate::surface::{InterceptionSurface, RequestAction, ResponseAction};

/// Binds a token-producing source flow to token-consuming target flows.
///
/// # Examples
///
/// ```no_run
/// use tokenbind::{HttpRequest, InterceptionSurface, RequestAction, TokenBinder};
///
/// async fn wire<S: InterceptionSurface + 'static>(surface: S) -> tokenbind::Result<()> {
///     let binder = TokenBinder::new(surface);
///     binder.apply_pattern_config(
///         "auth.example.com/login",
///         "api.example.com/v1/*",
///         "$.access_token",
///         "header",
///         "Authorization",
///         "Bearer {token}",
///     )?;
///
///     let request = HttpRequest::new("GET", "https://api.example.com/v1/users");
///     let outgoing = binder.on_request_to_send(&request).await.into_request(request);
///     println!("{:?}", outgoing.header("Authorization"));
///     Ok(())
/// }
/// ```
pub struct TokenBinder<S: InterceptionSurface> {
    surface: Arc<S>,
    state: SharedState,
    settings: Arc<BinderSettings>,
    events: Option<Arc<EventCallback>>,
    shutdown: CancellationToken,
}

impl<S: InterceptionSurface + 'static> TokenBinder<S> {
    pub fn new(surface: S) -> Self {
        let shutdown = CancellationToken::new();
        let state = SharedState::new(BinderState::new(shutdown.child_token()));
        Self {
            surface: Arc::new(surface),
            state,
            settings: Arc::new(BinderSettings::default()),
            events: None,
            shutdown,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: BinderSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    #[must_use]
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BinderEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(Box::new(callback)));
        self
    }

    pub fn settings(&self) -> &BinderSettings {
        &self.settings
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    // --- configuration surface ---

    /// Applies a pattern-mode binding.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a field is empty, the location is
    /// unknown, or a pattern does not compile. State is unchanged on error.
    pub fn apply_pattern_config(
        &self,
        source_pattern: &str,
        target_patterns_csv: &str,
        token_path: &str,
        location: &str,
        key: &str,
        format: &str,
    ) -> Result<()> {
        let config = config::pattern_binding(
            source_pattern,
            target_patterns_csv,
            token_path,
            location,
            key,
            format,
        )?;
        self.install(config, None)
    }

    /// Applies a flow-id-mode binding.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a field is empty, an identifier is
    /// malformed, or the location is unknown. State is unchanged on error.
    pub fn apply_flow_id_config(
        &self,
        source_id: &str,
        target_ids_csv: &str,
        token_path: &str,
        location: &str,
        key: &str,
        format: &str,
    ) -> Result<()> {
        let config = config::flow_id_binding(
            source_id,
            target_ids_csv,
            token_path,
            location,
            key,
            format,
        )?;
        self.install(config, None)
    }

    /// Applies a complete binding, including its auto-fetch flag.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the binding does not compile.
    pub fn apply(&self, config: BindingConfig) -> Result<()> {
        let auto_fetch = config.auto_fetch_enabled;
        self.install(config, Some(auto_fetch))
    }

    fn install(&self, config: BindingConfig, auto_fetch: Option<bool>) -> Result<()> {
        let mode = config.mode.clone();
        {
            let mut state = self.state.write();
            let enabled = auto_fetch.unwrap_or(state.auto_fetch_enabled);
            let binding = Binding::compile(config.with_auto_fetch(enabled))?;

            state.cancel.cancel();
            state.cancel = self.shutdown.child_token();
            state.generation += 1;
            state.binding = Some(Arc::new(binding));
            state.captured_template = None;
            state.auto_fetch_enabled = enabled;
        }

        info!(mode = %mode, "Binding applied");
        self.emit(BinderEvent::ConfigApplied(mode));
        Ok(())
    }

    pub fn set_auto_fetch_enabled(&self, enabled: bool) {
        let mut state = self.state.write();
        state.auto_fetch_enabled = enabled;
        let updated = state
            .binding
            .as_ref()
            .map(|b| Arc::new(b.with_auto_fetch(enabled)));
        state.binding = updated;
        debug!(enabled, "Auto-fetch toggled");
    }

    pub fn auto_fetch_enabled(&self) -> bool {
        self.state.read().auto_fetch_enabled
    }

    /// Returns the applied binding, if any.
    pub fn config(&self) -> Option<Arc<BindingConfig>> {
        self.state
            .read()
            .binding
            .as_ref()
            .map(|b| Arc::clone(b.config()))
    }

    /// Supplies a request to replay when none has been captured from traffic.
    pub fn set_source_request(&self, request: HttpRequest) {
        self.state.write().seeded_template = Some(request);
    }

    /// Returns the request auto-fetch would replay.
    pub fn source_template(&self) -> Option<HttpRequest> {
        self.state.read().replay_template().cloned()
    }

    pub fn current_token(&self) -> Option<SecretString> {
        self.state.read().store.get()
    }

    pub fn token_status(&self) -> Option<TokenStatus> {
        self.state.read().store.status()
    }

    pub fn clear_token(&self) {
        self.state.write().store.clear();
        info!("Token cleared");
        self.emit(BinderEvent::TokenCleared);
    }

    // --- interception callbacks ---

    /// Handles a request the surface is about to send.
    ///
    /// Always returns an action; every failure forwards the request as-is.
    #[instrument(skip(self, request), fields(url = %request.url, tool = %request.tool_source))]
    pub async fn on_request_to_send(&self, request: &HttpRequest) -> RequestAction {
        let (binding, auto_fetch, has_template) = {
            let state = self.state.read();
            (
                state.binding.clone(),
                state.auto_fetch_enabled,
                state.replay_template().is_some(),
            )
        };
        let Some(binding) = binding else {
            return RequestAction::ForwardUnmodified;
        };
        if binding.classify_request(request, &self.settings) == RequestRole::Passthrough {
            return RequestAction::ForwardUnmodified;
        }

        if auto_fetch && has_template {
            let outcome = self.refresh().await;
            debug!(outcome = %outcome, "Auto-fetch finished");
        }

        let Some(token) = self.current_token() else {
            debug!("No token stored, forwarding unmodified");
            return RequestAction::ForwardUnmodified;
        };

        let config = binding.config();
        match inject(
            request,
            token.expose_secret(),
            config.injection_location,
            &config.injection_key,
            &config.token_format,
        ) {
            Ok(rewritten) if rewritten != *request => {
                let masked = mask_token(token.expose_secret());
                info!(
                    location = %config.injection_location,
                    key = %config.injection_key,
                    token = %masked,
                    "Token injected"
                );
                self.emit(BinderEvent::TokenInjected {
                    url: request.url.clone(),
                    location: config.injection_location,
                    masked,
                });
                RequestAction::ForwardReplacement(rewritten)
            }
            Ok(_) => RequestAction::ForwardUnmodified,
            Err(e) => {
                warn!(error = %e, "Token injection failed, forwarding unmodified");
                self.emit(BinderEvent::InjectionFailed {
                    url: request.url.clone(),
                    reason: e.to_string(),
                });
                RequestAction::ForwardUnmodified
            }
        }
    }

    /// Handles a response the surface received.
    #[instrument(skip(self, response), fields(url = %response.url(), status = response.status))]
    pub async fn on_response_received(&self, response: &HttpResponse) -> ResponseAction {
        let (binding, generation) = {
            let state = self.state.read();
            (state.binding.clone(), state.generation)
        };
        let Some(binding) = binding else {
            return ResponseAction::Continue;
        };

        match binding.classify_response(response, &self.settings) {
            ResponseOutcome::Ignored => {}
            ResponseOutcome::Extracted { token, template } => {
                let masked = mask_token(&token);
                if !self.commit_extracted(generation, token, template) {
                    debug!("Binding replaced during classification, discarding token");
                    return ResponseAction::Continue;
                }
                info!(token = %masked, "Token extracted");
                self.emit(BinderEvent::TokenExtracted {
                    url: response.url().to_string(),
                    masked,
                });
            }
            ResponseOutcome::Missed { error, template } => {
                let preview = body_preview(&response.body);
                warn!(error = %error, body_preview = %preview, "Token extraction failed");
                if let Some(template) = template {
                    let mut state = self.state.write();
                    if state.generation == generation {
                        state.captured_template = Some(template);
                    }
                }
                self.emit(BinderEvent::ExtractionFailed {
                    url: response.url().to_string(),
                    reason: error.to_string(),
                    body_preview: preview.to_string(),
                });
            }
        }
        ResponseAction::Continue
    }

    /// Stores a token and its source template if `generation` is still current.
    fn commit_extracted(&self, generation: u64, token: String, template: HttpRequest) -> bool {
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        state.captured_template = Some(template);
        state.store.set(token);
        true
    }

    // --- lifecycle ---

    /// Replays the source request now and waits for the bounded refresh.
    ///
    /// Runs regardless of the auto-fetch flag.
    pub async fn refresh(&self) -> RefreshOutcome {
        let plan = RefreshPlan::resolve(&self.state.read(), &self.settings);
        let outcome = match plan {
            Ok(plan) => {
                let task = RefreshTask {
                    surface: Arc::clone(&self.surface),
                    state: self.state.clone(),
                    events: self.events.clone(),
                };
                task.run(plan, self.settings.auto_fetch_timeout()).await
            }
            Err(skipped) => {
                debug!(outcome = %skipped, "Auto-fetch skipped");
                skipped
            }
        };
        self.emit(BinderEvent::Refreshed(outcome.clone()));
        outcome
    }

    /// Cancels every refresh in flight; later ones are cancelled on start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        info!("Binder shut down");
    }

    fn emit(&self, event: BinderEvent) {
        if let Some(callback) = &self.events {
            callback(&event);
        }
    }
}

impl<S: InterceptionSurface> Drop for TokenBinder<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
