//! Backend token pair coordination.
//!
//! The pair is read by everyone but written only by [`RefreshCoordinator`]
//! (and the external login flow). A refresh is single-flight: however many
//! callers notice an expired access token at once, one refresh call is made
//! and all of them share its result.

mod backend;
mod interceptor;
mod refresh;
mod status;
mod store;

pub use backend::{
    AuthBackend, BackendError, BackendRequest, HttpBackend, ProbeOutcome, RefreshOutcome,
};
pub use interceptor::{RequestInterceptor, is_auth_failure};
pub use refresh::RefreshCoordinator;
pub use status::{AuthState, AuthStatusCache, PROBE_TIMEOUT, STATUS_TTL};
pub use store::{HttpTokenStore, MemoryTokenStore, StoreError, TOKEN_CACHE_KEY, TokenPair, TokenStore};
