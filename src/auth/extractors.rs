//! Axum extractors for the local session.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use super::cookie::{SESSION_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthFailure};
use super::state::HasAuthState;
use crate::session::{SessionClaims, SessionKeys};

/// Validate the session cookie, if any.
pub fn session_from_headers(headers: &HeaderMap, keys: &SessionKeys) -> Option<SessionClaims> {
    let token = get_cookie(headers, SESSION_COOKIE_NAME)?;
    match keys.validate(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring invalid session cookie");
            None
        }
    }
}

/// Extractor for API endpoints that require a local session.
/// Returns JSON errors instead of redirects.
pub struct Session(pub SessionClaims);

impl<S> FromRequestParts<S> for Session
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        session_from_headers(&parts.headers, state.sessions())
            .map(Session)
            .ok_or_else(|| ApiAuthError::new(AuthFailure::SessionAbsent))
    }
}

/// Optional session extractor - never fails.
pub struct MaybeSession(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(session_from_headers(
            &parts.headers,
            state.sessions(),
        )))
    }
}
