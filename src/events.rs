//! Auth state change notifications.
//!
//! Each state change is emitted once. Escalations to the login page are
//! debounced: a burst of failing requests produces a single navigation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Window in which repeated escalations collapse into one.
pub const ESCALATION_DEBOUNCE: Duration = Duration::from_secs(1);

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Navigate to `location` to re-authenticate
    LoginRequired { location: String },
    SignedIn,
    SignedOut,
}

#[derive(Default)]
struct EmitState {
    last_escalation: Option<Instant>,
    signed_in: Option<bool>,
}

struct Inner {
    sender: broadcast::Sender<AuthEvent>,
    state: Mutex<EmitState>,
    debounce: Duration,
}

/// Broadcast channel for auth events, owned by the coordinator.
#[derive(Clone)]
pub struct AuthEvents {
    inner: Arc<Inner>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        Self::with_debounce(ESCALATION_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                sender,
                state: Mutex::new(EmitState::default()),
                debounce,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.sender.subscribe()
    }

    /// Request navigation to the login page. Returns whether an event was
    /// emitted; `false` means an escalation is already under way.
    pub fn escalate(&self, location: impl Into<String>) -> bool {
        let mut state = self.lock();
        let now = Instant::now();
        if let Some(last) = state.last_escalation {
            if now.duration_since(last) < self.inner.debounce {
                debug!("Escalation already pending, skipping");
                return false;
            }
        }
        state.last_escalation = Some(now);
        drop(state);

        let location = location.into();
        info!(location = %location, "Login required");
        self.emit(AuthEvent::LoginRequired { location });
        true
    }

    /// Record a completed login. Emits only on an actual change.
    pub fn signed_in(&self) -> bool {
        self.transition(true, AuthEvent::SignedIn)
    }

    /// Record a logout. Emits only on an actual change.
    pub fn signed_out(&self) -> bool {
        self.transition(false, AuthEvent::SignedOut)
    }

    fn transition(&self, signed_in: bool, event: AuthEvent) -> bool {
        let mut state = self.lock();
        // Any credential change re-arms escalation.
        state.last_escalation = None;
        if state.signed_in == Some(signed_in) {
            return false;
        }
        state.signed_in = Some(signed_in);
        drop(state);

        self.emit(event);
        true
    }

    fn emit(&self, event: AuthEvent) {
        if self.inner.sender.send(event).is_err() {
            debug!("No auth event subscribers");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EmitState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
