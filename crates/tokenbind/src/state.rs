//! Mutable binder state behind a single lock.
//!
//! The applied binding, the source templates and the token store are read and
//! replaced together, so a decision never mixes values from two
//! configurations. The lock is never held across an await point.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokenbind_common::HttpRequest;
use tokio_util::sync::CancellationToken;

use crate::classifier::Binding;
use crate::store::TokenStore;

#[derive(Debug)]
pub(crate) struct BinderState {
    /// Current binding snapshot; `None` until the first apply.
    pub(crate) binding: Option<Arc<Binding>>,
    /// Last source request seen in intercepted traffic.
    pub(crate) captured_template: Option<HttpRequest>,
    /// Request supplied by the embedder, used when nothing was captured.
    pub(crate) seeded_template: Option<HttpRequest>,
    pub(crate) store: TokenStore,
    pub(crate) auto_fetch_enabled: bool,
    /// Bumped by every apply; refreshes started earlier do not commit.
    pub(crate) generation: u64,
    /// Cancels refreshes of the current generation.
    pub(crate) cancel: CancellationToken,
}

impl BinderState {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self {
            binding: None,
            captured_template: None,
            seeded_template: None,
            store: TokenStore::new(),
            auto_fetch_enabled: true,
            generation: 0,
            cancel,
        }
    }

    /// Request to replay, preferring one captured from real traffic.
    pub(crate) fn replay_template(&self) -> Option<&HttpRequest> {
        self.captured_template
            .as_ref()
            .or(self.seeded_template.as_ref())
    }
}

/// Cheaply cloneable handle to the state.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<RwLock<BinderState>>);

impl SharedState {
    pub(crate) fn new(state: BinderState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    // A panic while holding the lock cannot leave a half-replaced field, so a
    // poisoned lock is still safe to use.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, BinderState> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, BinderState> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
