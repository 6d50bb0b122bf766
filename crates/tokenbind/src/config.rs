//! Binder settings and declarative config files.
//!
//! A config file is read from `~/.config/tokenbind/config.toml` by default.
//! YAML and JSON files with the same shape are accepted by extension.
//!
//! ## Example Configuration
//!
//! ```toml
//! [binding]
//! mode = "pattern"
//! source = "auth.example.com/oauth/token"
//! targets = "api.example.com/v1/*, api.example.com/v2/*"
//! token_path = "$.access_token"
//! location = "header"
//! key = "Authorization"
//! format = "Bearer {token}"
//!
//! [settings]
//! auto_fetch_timeout_ms = 2000
//! reverse_containment = false
//!
//! [source_request]
//! method = "POST"
//! url = "https://auth.example.com/oauth/token"
//! body = "grant_type=client_credentials"
//! headers = [{ name = "Content-Type", value = "application/x-www-form-urlencoded" }]
//! ```
//!
//! Nothing here is ever written back: configuration and tokens live only for
//! the lifetime of the process.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokenbind_common::binding::split_csv;
use tokenbind_common::{
    AddressingMode, BindingConfig, FlowId, HttpRequest, InjectionLocation, TokenFormat, ToolSource,
};

use crate::classifier::Binding;
use crate::error::{BindError, Result};

/// Tunables of the binder that are not part of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinderSettings {
    /// Upper bound the request path waits for a replay (default: 2000)
    #[serde(default = "default_auto_fetch_timeout_ms")]
    pub auto_fetch_timeout_ms: u64,

    /// Skip the replay while the stored token is younger than this (default: always replay)
    #[serde(default)]
    pub token_reuse_window_ms: Option<u64>,

    /// Also match when a plain pattern contains the URL (default: true)
    #[serde(default = "default_reverse_containment")]
    pub reverse_containment: bool,

    /// Honor request flow ids in flow id mode (default: false)
    #[serde(default)]
    pub strict_flow_ids: bool,

    /// Tool whose traffic is classified (default: repeater)
    #[serde(default)]
    pub addressed_tool: ToolSource,
}

impl Default for BinderSettings {
    fn default() -> Self {
        Self {
            auto_fetch_timeout_ms: default_auto_fetch_timeout_ms(),
            token_reuse_window_ms: None,
            reverse_containment: default_reverse_containment(),
            strict_flow_ids: false,
            addressed_tool: ToolSource::default(),
        }
    }
}

const fn default_auto_fetch_timeout_ms() -> u64 {
    2000
}

const fn default_reverse_containment() -> bool {
    true
}

impl BinderSettings {
    pub const fn auto_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.auto_fetch_timeout_ms)
    }

    pub fn token_reuse_window(&self) -> Option<Duration> {
        self.token_reuse_window_ms.map(Duration::from_millis)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the auto-fetch timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.auto_fetch_timeout_ms == 0 {
            return Err(BindError::Config(
                "auto_fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a flow identifier typed into a settings field.
///
/// # Errors
///
/// Returns an error if the input is not a non-negative integer.
pub fn parse_flow_id(input: &str) -> Result<FlowId> {
    input.parse().map_err(|_| BindError::InvalidFlowId {
        value: input.trim().to_string(),
    })
}

/// Builds a pattern-mode binding from raw settings fields.
///
/// `targets_csv` is split on commas; entries are trimmed and blanks dropped.
/// A blank `format` falls back to `Bearer {token}`.
///
/// # Errors
///
/// Returns an error if a required field is empty or the location is unknown.
pub fn pattern_binding(
    source: &str,
    targets_csv: &str,
    token_path: &str,
    location: &str,
    key: &str,
    format: &str,
) -> Result<BindingConfig> {
    let source = required(source, "source")?;
    let targets: Vec<String> = split_csv(targets_csv)
        .into_iter()
        .map(str::to_string)
        .collect();
    if targets.is_empty() {
        return Err(BindError::EmptyField("targets"));
    }
    binding_config(
        AddressingMode::Pattern {
            source: source.to_string(),
            targets,
        },
        token_path,
        location,
        key,
        format,
    )
}

/// Builds a flow-id-mode binding from raw settings fields.
///
/// Every identifier must parse; one bad entry rejects the whole binding.
///
/// # Errors
///
/// Returns an error if a required field is empty, an identifier is not a
/// non-negative integer, or the location is unknown.
pub fn flow_id_binding(
    source_id: &str,
    target_ids_csv: &str,
    token_path: &str,
    location: &str,
    key: &str,
    format: &str,
) -> Result<BindingConfig> {
    let source = parse_flow_id(required(source_id, "source")?)?;
    let targets = split_csv(target_ids_csv)
        .into_iter()
        .map(parse_flow_id)
        .collect::<Result<Vec<_>>>()?;
    if targets.is_empty() {
        return Err(BindError::EmptyField("targets"));
    }
    binding_config(
        AddressingMode::FlowId { source, targets },
        token_path,
        location,
        key,
        format,
    )
}

fn binding_config(
    mode: AddressingMode,
    token_path: &str,
    location: &str,
    key: &str,
    format: &str,
) -> Result<BindingConfig> {
    let token_path = required(token_path, "token_path")?;
    let injection_location: InjectionLocation = location
        .parse()
        .map_err(|e: anyhow::Error| BindError::Config(e.to_string()))?;
    let injection_key = required(key, "injection_key")?;

    Ok(BindingConfig {
        mode,
        token_path: token_path.to_string(),
        injection_location,
        injection_key: injection_key.to_string(),
        token_format: TokenFormat::new(format),
        auto_fetch_enabled: true,
    })
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BindError::EmptyField(field));
    }
    Ok(trimmed)
}

/// Addressing mode name as written in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    #[default]
    Pattern,
    FlowId,
}

/// The `[binding]` section: the same fields the settings panel offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSection {
    #[serde(default)]
    pub mode: ModeName,

    /// Source URL pattern or flow id
    pub source: String,

    /// Comma-separated target URL patterns or flow ids
    pub targets: String,

    pub token_path: String,

    /// Injection location name (default: header)
    #[serde(default = "default_location")]
    pub location: String,

    pub key: String,

    /// Token template (default: `Bearer {token}`)
    #[serde(default)]
    pub format: String,

    /// Whether target requests replay the source first (default: true)
    #[serde(default = "default_auto_fetch")]
    pub auto_fetch: bool,
}

fn default_location() -> String {
    InjectionLocation::Header.to_string()
}

const fn default_auto_fetch() -> bool {
    true
}

impl BindingSection {
    /// Converts the section into a binding.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is rejected by [`pattern_binding`] or
    /// [`flow_id_binding`].
    pub fn to_binding_config(&self) -> Result<BindingConfig> {
        let config = match self.mode {
            ModeName::Pattern => pattern_binding(
                &self.source,
                &self.targets,
                &self.token_path,
                &self.location,
                &self.key,
                &self.format,
            ),
            ModeName::FlowId => flow_id_binding(
                &self.source,
                &self.targets,
                &self.token_path,
                &self.location,
                &self.key,
                &self.format,
            ),
        }?;
        Ok(config.with_auto_fetch(self.auto_fetch))
    }
}

/// A complete config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub binding: BindingSection,

    #[serde(default)]
    pub settings: BinderSettings,

    /// Request replayed by `tokenbind fetch` when no traffic has been seen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request: Option<HttpRequest>,
}

impl ConfigFile {
    /// Loads configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config directory cannot be determined
    /// - The file doesn't exist
    /// - Deserialization or validation fails
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Err(BindError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        Self::from_file(&path)
    }

    /// Loads and validates a config file, choosing the format by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the extension is not one
    /// of `.toml`, `.yaml`, `.yml` or `.json`, or the content is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;

        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&contents)?,
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
            Some("json") => serde_json::from_str(&contents)?,
            _ => {
                return Err(BindError::Config(
                    "Unsupported config file format. Use .toml, .yaml, .yml, or .json".to_string(),
                ));
            }
        };
        config.validate()?;

        Ok(config)
    }

    /// Returns the default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BindError::Config("Failed to determine config directory".to_string()))?
            .join("tokenbind");

        Ok(config_dir.join("config.toml"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The binding is rejected
    /// - A URL pattern does not compile
    /// - A setting is out of range
    pub fn validate(&self) -> Result<()> {
        Binding::compile(self.binding.to_binding_config()?)?;
        self.settings.validate()
    }

    /// Returns the compiled binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding is rejected.
    pub fn binding(&self) -> Result<BindingConfig> {
        self.binding.to_binding_config()
    }
}
