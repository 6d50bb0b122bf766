//! Routing of intercepted traffic to the source and target roles.
//!
//! Classification is pure: it reads an immutable [`Binding`] snapshot and the
//! binder settings and returns a decision. Committing a decision to the token
//! store and the source template is up to the caller, which does so under its
//! own lock.

use std::sync::Arc;

use tokenbind_common::{AddressingMode, BindingConfig, FlowId, HttpRequest, HttpResponse};

use crate::config::BinderSettings;
use crate::error::{BindError, ExtractError, Result};
use crate::extract::TokenPath;
use crate::matcher::UrlPattern;

#[derive(Debug, Clone)]
enum Roles {
    Pattern {
        source: UrlPattern,
        targets: Vec<UrlPattern>,
    },
    FlowId {
        source: FlowId,
        targets: Vec<FlowId>,
    },
}

/// An applied binding with its matchers and token path compiled.
#[derive(Debug, Clone)]
pub struct Binding {
    config: Arc<BindingConfig>,
    token_path: TokenPath,
    roles: Roles,
}

impl Binding {
    /// Validates and compiles a binding.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is empty, there are no targets,
    /// or a URL pattern does not compile.
    pub fn compile(config: BindingConfig) -> Result<Self> {
        if config.injection_key.trim().is_empty() {
            return Err(BindError::EmptyField("injection_key"));
        }
        let token_path = TokenPath::parse(&config.token_path)?;

        let roles = match &config.mode {
            AddressingMode::Pattern { source, targets } => {
                if targets.is_empty() {
                    return Err(BindError::EmptyField("targets"));
                }
                Roles::Pattern {
                    source: UrlPattern::new(source.as_str())?,
                    targets: targets
                        .iter()
                        .map(|t| UrlPattern::new(t.as_str()))
                        .collect::<Result<_>>()?,
                }
            }
            AddressingMode::FlowId { source, targets } => {
                if targets.is_empty() {
                    return Err(BindError::EmptyField("targets"));
                }
                Roles::FlowId {
                    source: *source,
                    targets: targets.clone(),
                }
            }
        };

        Ok(Self {
            config: Arc::new(config),
            token_path,
            roles,
        })
    }

    /// Returns a copy with a different auto-fetch flag; matchers are reused.
    #[must_use]
    pub fn with_auto_fetch(&self, enabled: bool) -> Self {
        Self {
            config: Arc::new((*self.config).clone().with_auto_fetch(enabled)),
            token_path: self.token_path.clone(),
            roles: self.roles.clone(),
        }
    }

    pub const fn config(&self) -> &Arc<BindingConfig> {
        &self.config
    }

    pub const fn token_path(&self) -> &TokenPath {
        &self.token_path
    }

    /// Whether a response may carry the token.
    ///
    /// In flow id mode every response is eligible unless strict flow ids are
    /// on and the initiating request names another flow.
    pub fn is_source_response(&self, response: &HttpResponse, settings: &BinderSettings) -> bool {
        match &self.roles {
            Roles::Pattern { source, .. } => {
                source.matches(response.url(), settings.reverse_containment)
            }
            Roles::FlowId { source, .. } => {
                match (settings.strict_flow_ids, response.initiating_request.flow_id) {
                    (true, Some(id)) => id == *source,
                    _ => true,
                }
            }
        }
    }

    /// Whether an outgoing request should receive the token.
    pub fn is_target_request(&self, request: &HttpRequest, settings: &BinderSettings) -> bool {
        match &self.roles {
            Roles::Pattern { targets, .. } => targets
                .iter()
                .any(|t| t.matches(&request.url, settings.reverse_containment)),
            Roles::FlowId { targets, .. } => match (settings.strict_flow_ids, request.flow_id) {
                (true, Some(id)) => targets.contains(&id),
                _ => true,
            },
        }
    }

    /// Decides what an incoming response means for the token and template.
    pub fn classify_response(
        &self,
        response: &HttpResponse,
        settings: &BinderSettings,
    ) -> ResponseOutcome {
        if *response.tool_source() != settings.addressed_tool {
            return ResponseOutcome::Ignored;
        }
        if !self.is_source_response(response, settings) {
            return ResponseOutcome::Ignored;
        }

        let template = response.initiating_request.clone();
        match self.token_path.extract(&response.body) {
            Ok(token) => ResponseOutcome::Extracted { token, template },
            Err(error) => {
                // An empty response is not a usable source exchange
                let keep = self.config.mode.is_pattern() && error != ExtractError::EmptyBody;
                ResponseOutcome::Missed {
                    error,
                    template: keep.then_some(template),
                }
            }
        }
    }

    /// Decides whether an outgoing request is a target.
    pub fn classify_request(&self, request: &HttpRequest, settings: &BinderSettings) -> RequestRole {
        if request.tool_source != settings.addressed_tool {
            return RequestRole::Passthrough;
        }
        if self.is_target_request(request, settings) {
            RequestRole::Target
        } else {
            RequestRole::Passthrough
        }
    }
}

/// Result of classifying an incoming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Not from the addressed tool, or not a source response.
    Ignored,
    /// A token was found; the template and token are both replaced.
    Extracted { token: String, template: HttpRequest },
    /// Eligible, but nothing was extracted. The token is left alone; the
    /// template is replaced only in pattern mode.
    Missed {
        error: ExtractError,
        template: Option<HttpRequest>,
    },
}

/// Role of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRole {
    Target,
    Passthrough,
}
