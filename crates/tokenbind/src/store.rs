//! The single current token and when it was fetched.
//!
//! There is no expiry: a token stays current until it is replaced by the next
//! successful extraction or explicitly cleared.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Tokens up to this many characters are shown unmasked.
const MASK_THRESHOLD: usize = 10;

/// Characters kept visible at each end of a masked token.
const MASK_VISIBLE: usize = 4;

/// Renders a token for logs: `abcd...wxyz` when longer than ten characters.
///
/// ```
/// use tokenbind::store::mask_token;
///
/// assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9"), "eyJh...NiJ9");
/// assert_eq!(mask_token("short"), "short");
/// ```
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= MASK_THRESHOLD {
        return token.to_string();
    }
    let head: String = token.chars().take(MASK_VISIBLE).collect();
    let tail: String = token.chars().skip(count - MASK_VISIBLE).collect();
    format!("{head}...{tail}")
}

/// A fetched token value with its fetch time. Replaced, never mutated.
#[derive(Clone)]
pub struct TokenState {
    value: SecretString,
    fetched_at: DateTime<Utc>,
}

impl TokenState {
    fn new(value: String) -> Self {
        Self {
            value: SecretString::new(value.into()),
            fetched_at: Utc::now(),
        }
    }

    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    pub const fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Time since the token was fetched; zero if the clock moved backwards.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at).to_std().unwrap_or_default()
    }

    /// Whether the token was fetched less than `window` ago.
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age() < window
    }

    pub fn masked(&self) -> String {
        mask_token(self.value.expose_secret())
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("value", &self.masked())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Status snapshot for a settings panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    /// Masked token value.
    pub masked: String,
    pub fetched_at: DateTime<Utc>,
    pub age: Duration,
}

/// Holds at most one token.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    current: Option<TokenState>,
}

impl TokenStore {
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Replaces the token and its fetch time together.
    pub fn set(&mut self, value: impl Into<String>) {
        self.current = Some(TokenState::new(value.into()));
    }

    /// Returns the current token, if any.
    pub fn get(&self) -> Option<SecretString> {
        self.current.as_ref().map(|s| s.value.clone())
    }

    /// Removes the token.
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub const fn state(&self) -> Option<&TokenState> {
        self.current.as_ref()
    }

    pub const fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn status(&self) -> Option<TokenStatus> {
        self.current.as_ref().map(|s| TokenStatus {
            masked: s.masked(),
            fetched_at: s.fetched_at,
            age: s.age(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_set_replaces_value() {
        let mut store = TokenStore::new();
        assert!(store.get().is_none());

        store.set("A");
        store.set("B");

        assert_eq!(store.get().unwrap().expose_secret(), "B");
    }

    #[test]
    fn test_clear_empties_store() {
        let mut store = TokenStore::new();
        store.set("A");
        store.clear();

        assert!(store.get().is_none());
        assert!(store.is_empty());
        assert!(store.status().is_none());
    }

    #[test]
    fn test_set_updates_fetched_at() {
        let mut store = TokenStore::new();
        store.set("A");
        let first = store.state().unwrap().fetched_at();

        std::thread::sleep(Duration::from_millis(5));
        store.set("B");
        let second = store.state().unwrap().fetched_at();

        assert!(second > first);
    }

    #[test]
    fn test_freshness_window() {
        let mut store = TokenStore::new();
        store.set("A");
        let state = store.state().unwrap();

        assert!(state.is_fresh(Duration::from_secs(60)));
        assert!(!state.is_fresh(Duration::ZERO));
    }

    #[test]
    fn test_debug_masks_value() {
        let mut store = TokenStore::new();
        store.set("super-secret-token-value");
        let debug = format!("{store:?}");

        assert!(!debug.contains("super-secret-token-value"));
        assert!(debug.contains("supe...alue"));
    }

    #[test]
    fn test_mask_token_boundaries() {
        assert_eq!(mask_token(""), "");
        assert_eq!(mask_token("0123456789"), "0123456789");
        assert_eq!(mask_token("0123456789a"), "0123...789a");
        assert_eq!(mask_token("ééééééééééé"), "éééé...éééé");
    }

    #[test]
    fn test_status_snapshot() {
        let mut store = TokenStore::new();
        store.set("abcdefghijklmnop");
        let status = store.status().unwrap();

        assert_eq!(status.masked, "abcd...mnop");
        assert_eq!(status.fetched_at, store.state().unwrap().fetched_at());
    }
}
