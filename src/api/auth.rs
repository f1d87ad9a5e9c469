//! Auth status endpoints.
//!
//! - GET `/status` - Credential status, cached for a few minutes (`?force=true` re-probes)
//! - POST `/tokens` - Hand over the backend token pair obtained at login
//! - POST `/logout` - Clear backend tokens and the session cookie

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use super::error::{ApiError, ResultExt};
use crate::AppState;
use crate::auth::{HasAuthState, MaybeSession, Session, clear_session_cookie};
use crate::tokens::{AuthState, TokenPair};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/tokens", post(store_tokens))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize, Default)]
struct StatusQuery {
    #[serde(default)]
    force: bool,
}

async fn status(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    Query(query): Query<StatusQuery>,
) -> Json<AuthState> {
    let mut status = state.coordinator().status(query.force).await;
    status.has_session = session.is_some();
    Json(status)
}

#[derive(Deserialize)]
struct TokensRequest {
    access: String,
    refresh: String,
}

async fn store_tokens(
    State(state): State<AppState>,
    Session(_session): Session,
    Json(body): Json<TokensRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.access.is_empty() || body.refresh.is_empty() {
        return Err(ApiError::bad_request("Both access and refresh tokens are required"));
    }

    state
        .coordinator()
        .complete_login(TokenPair::new(body.access, body.refresh))
        .await
        .upstream_err("Failed to store backend tokens")?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Logout always clears the session cookie, even when the token cache
/// could not be reached.
async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let tokens_cleared = state.coordinator().logout().await.is_ok();

    (
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie(state.secure_cookies()))],
        Json(serde_json::json!({ "success": true, "tokensCleared": tokens_cleared })),
    )
}
