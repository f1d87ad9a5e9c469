//! Short-lived memo of "are the current credentials valid".
//!
//! One entry for the whole process: the application represents a single
//! signed-in identity at a time. Transient probe failures never invalidate
//! the entry; they fall back to the last known state, or to "valid" when
//! there is none.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::backend::{AuthBackend, ProbeOutcome};
use super::store::{TokenStore, now_millis};
use crate::auth::AuthFailure;

/// How long a probe result is served from cache.
pub const STATUS_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound for the status probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Snapshot of both credential layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub has_session: bool,
    pub has_backend_tokens: bool,
    pub tokens_valid: bool,
    /// Unix milliseconds of the probe that produced this state
    pub last_checked_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub from_cache: bool,
}

impl AuthState {
    fn probed(has_backend_tokens: bool, tokens_valid: bool) -> Self {
        Self {
            has_session: false,
            has_backend_tokens,
            tokens_valid,
            last_checked_at: now_millis(),
            error: None,
            from_cache: false,
        }
    }
}

struct CachedState {
    state: AuthState,
    checked: Instant,
}

pub struct AuthStatusCache {
    store: Arc<dyn TokenStore>,
    backend: Arc<dyn AuthBackend>,
    entry: Mutex<Option<CachedState>>,
    /// Serializes probes so a burst of misses produces one probe.
    probing: Mutex<()>,
}

impl AuthStatusCache {
    pub fn new(store: Arc<dyn TokenStore>, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            store,
            backend,
            entry: Mutex::new(None),
            probing: Mutex::new(()),
        }
    }

    /// Current credential state, from cache when fresh.
    pub async fn check(&self, force_refresh: bool) -> AuthState {
        if !force_refresh {
            if let Some(state) = self.fresh().await {
                return state;
            }
        }

        let _probing = self.probing.lock().await;

        // Another caller may have probed while we waited.
        if !force_refresh {
            if let Some(state) = self.fresh().await {
                return state;
            }
        }

        self.probe().await
    }

    /// Drop the cached state. Call after any credential change.
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
        debug!("Auth status cache invalidated");
    }

    async fn fresh(&self) -> Option<AuthState> {
        let entry = self.entry.lock().await;
        let cached = entry.as_ref()?;
        if cached.checked.elapsed() >= STATUS_TTL {
            return None;
        }
        let mut state = cached.state.clone();
        state.from_cache = true;
        Some(state)
    }

    async fn remember(&self, state: AuthState) -> AuthState {
        *self.entry.lock().await = Some(CachedState {
            state: state.clone(),
            checked: Instant::now(),
        });
        state
    }

    async fn probe(&self) -> AuthState {
        // Not cached: tokens written to the store by another node show up
        // on the next check.
        let Some(pair) = self.store.get().await else {
            debug!("No backend tokens, status is unauthenticated");
            *self.entry.lock().await = None;
            return AuthState::probed(false, false);
        };

        let outcome = tokio::time::timeout(PROBE_TIMEOUT, self.backend.whoami(&pair.access))
            .await
            .unwrap_or_else(|_| ProbeOutcome::Failed("status probe timed out".into()));

        match outcome {
            ProbeOutcome::Valid => self.remember(AuthState::probed(true, true)).await,
            ProbeOutcome::Unauthorized => self.remember(AuthState::probed(true, false)).await,
            ProbeOutcome::Failed(reason) => self.stale_or_assumed(reason).await,
        }
    }

    /// Fallback for probes that could not complete.
    async fn stale_or_assumed(&self, reason: String) -> AuthState {
        let entry = self.entry.lock().await;
        match entry.as_ref() {
            Some(cached) => {
                warn!(
                    reason = %reason,
                    failure = ?AuthFailure::TransientNetworkError,
                    "Status probe failed, serving previous state"
                );
                let mut state = cached.state.clone();
                state.from_cache = true;
                state.error = Some(reason);
                state
            }
            None => {
                warn!(
                    reason = %reason,
                    failure = ?AuthFailure::TransientNetworkError,
                    "Status probe failed, assuming credentials valid"
                );
                let mut state = AuthState::probed(true, true);
                state.error = Some(reason);
                state
            }
        }
    }
}
