//! Local session handling and the HTTP side of authentication failures.
//!
//! Two independent credential layers: the local session cookie, validated
//! here, and the backend token pair, coordinated by [`crate::tokens`].

mod cookie;
mod errors;
mod extractors;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME, clear_session_cookie,
    get_cookie,
};
pub use errors::{ApiAuthError, AuthFailure, GateRedirect};
pub use extractors::{MaybeSession, Session, session_from_headers};
pub use state::HasAuthState;
