//! Authenticated pass-through to the backend API.
//!
//! - ANY `/{*path}` - Forward to `{backend}/{path}` with the stored access token
//!
//! Calls go through the request interceptor, so an expired access token is
//! refreshed and the call retried once. A response that is still 401/403 is
//! answered with a JSON error carrying the login page to navigate to.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response},
    routing::any,
};

use super::error::{ApiError, ResultExt};
use crate::AppState;
use crate::auth::{ApiAuthError, AuthFailure, HasAuthState, Session};
use crate::tokens::{BackendError, BackendRequest, is_auth_failure};

/// Request headers passed on to the backend.
const FORWARDED_REQUEST_HEADERS: [header::HeaderName; 3] =
    [header::ACCEPT, header::CONTENT_TYPE, header::ACCEPT_LANGUAGE];

/// Response headers passed back to the caller.
const FORWARDED_RESPONSE_HEADERS: [header::HeaderName; 3] =
    [header::CONTENT_TYPE, header::CACHE_CONTROL, header::ETAG];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(forward))
        .with_state(state)
}

async fn forward(
    State(state): State<AppState>,
    Session(_session): Session,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(ApiError::bad_request("Invalid backend path"));
    }

    let coordinator = state.coordinator();
    let page = referring_page(&headers, &state);

    let mut request = BackendRequest::new(method, path).with_body(body);
    if let Some(query) = query {
        request = request.with_query(query);
    }
    for name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = headers.get(&name) {
            request = request.with_header(name, value.clone());
        }
    }
    if let Some(page) = page.clone() {
        request = request.from_page(page);
    }

    let response = match coordinator.execute(request).await {
        Err(BackendError::CredentialAbsent) => {
            return Ok(login_required(&state, page.as_deref(), AuthFailure::CredentialAbsent));
        }
        result => result.upstream_err("Backend request failed")?,
    };

    let status = response.status();
    if is_auth_failure(status) {
        return Ok(login_required(&state, page.as_deref(), AuthFailure::CredentialExpired));
    }

    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_RESPONSE_HEADERS {
        if let Some(value) = response.headers().get(&name) {
            forwarded.insert(name, value.clone());
        }
    }
    let body = response
        .bytes()
        .await
        .upstream_err("Failed to read backend response")?;

    Ok((status, forwarded, Body::from(body)).into_response())
}

fn login_required(state: &AppState, page: Option<&str>, failure: AuthFailure) -> Response {
    let location = state.coordinator().interceptor().login_target(page, failure);
    ApiAuthError::with_redirect(failure, location).into_response()
}

/// Same-origin page the call was made from, taken from the Referer.
fn referring_page(headers: &HeaderMap, state: &AppState) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    state.coordinator().redirects().validate(referer)
}
