//! Authentication failure taxonomy and HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

/// Why a credential check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No local session
    SessionAbsent,
    /// No backend token pair in the store
    CredentialAbsent,
    /// Business call answered 401/403, even after a refresh
    CredentialExpired,
    /// Refresh endpoint refused the refresh token
    RefreshRejected,
    /// Status probe could not complete
    TransientNetworkError,
    /// Callback URL failed validation
    UnsafeRedirectTarget,
}

impl AuthFailure {
    /// Value of the `reason` query parameter on login redirects.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::SessionAbsent => "signin_required",
            AuthFailure::CredentialAbsent => "login_required",
            AuthFailure::CredentialExpired | AuthFailure::RefreshRejected => "session_expired",
            AuthFailure::TransientNetworkError => "network_error",
            AuthFailure::UnsafeRedirectTarget => "invalid_redirect",
        }
    }

    /// Human-readable message shown alongside the redirect.
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::SessionAbsent => "Please sign in to continue",
            AuthFailure::CredentialAbsent => "Please log in to access this area",
            AuthFailure::CredentialExpired | AuthFailure::RefreshRejected => {
                "Your session has expired, please log in again"
            }
            AuthFailure::TransientNetworkError => "Could not reach the authentication service",
            AuthFailure::UnsafeRedirectTarget => "Invalid redirect target",
        }
    }
}

/// API authentication error (JSON body, optional login target).
#[derive(Debug)]
pub struct ApiAuthError {
    pub failure: AuthFailure,
    pub redirect: Option<String>,
}

impl ApiAuthError {
    pub fn new(failure: AuthFailure) -> Self {
        Self {
            failure,
            redirect: None,
        }
    }

    pub fn with_redirect(failure: AuthFailure, redirect: String) -> Self {
        Self {
            failure,
            redirect: Some(redirect),
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            reason: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            redirect: Option<String>,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: self.failure.message(),
                reason: self.failure.reason(),
                redirect: self.redirect,
            }),
        )
            .into_response()
    }
}

/// Page admission failure - redirects to the sign-in or login page.
#[derive(Debug)]
pub struct GateRedirect {
    pub location: String,
}

impl IntoResponse for GateRedirect {
    fn into_response(self) -> Response {
        Redirect::temporary(&self.location).into_response()
    }
}
