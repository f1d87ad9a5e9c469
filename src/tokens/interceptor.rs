//! Refresh-and-retry wrapper for authenticated backend calls.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info};

use super::backend::{BackendError, BackendRequest, HttpBackend};
use super::refresh::RefreshCoordinator;
use super::store::TokenStore;
use crate::auth::AuthFailure;
use crate::events::AuthEvents;
use crate::redirect::RedirectManager;

/// Statuses that mean "the access token was not accepted".
pub fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Wraps every backend call that needs the access token.
///
/// A 401/403 triggers at most one refresh and one retry of the original
/// request. When that does not help, the user is sent to the login page
/// through [`AuthEvents`] and the failing response is handed back.
#[derive(Clone)]
pub struct RequestInterceptor {
    backend: Arc<HttpBackend>,
    store: Arc<dyn TokenStore>,
    refresher: RefreshCoordinator,
    events: AuthEvents,
    redirects: RedirectManager,
    login_path: String,
}

impl RequestInterceptor {
    pub fn new(
        backend: Arc<HttpBackend>,
        store: Arc<dyn TokenStore>,
        refresher: RefreshCoordinator,
        events: AuthEvents,
        redirects: RedirectManager,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            store,
            refresher,
            events,
            redirects,
            login_path: login_path.into(),
        }
    }

    /// Send `request`, refreshing and retrying once on an auth failure.
    ///
    /// Without a stored pair nothing is sent: the login escalation is issued
    /// and [`BackendError::CredentialAbsent`] returned. A returned 401/403 is
    /// terminal, the escalation has already been issued.
    pub async fn execute(
        &self,
        request: BackendRequest,
    ) -> Result<reqwest::Response, BackendError> {
        let Some(sent_with) = self.store.get().await.map(|pair| pair.access) else {
            debug!(path = %request.path, "No backend tokens for authenticated call");
            self.escalate(&request, AuthFailure::CredentialAbsent);
            return Err(BackendError::CredentialAbsent);
        };

        let response = self.backend.send(&request, &sent_with).await?;
        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        // Skip the refresh when another caller already replaced the token we
        // sent; the retry picks up the new one.
        let current = self.store.get().await.map(|pair| pair.access);
        let already_refreshed = current.as_ref().is_some_and(|access| *access != sent_with);
        if !already_refreshed && !self.refresher.refresh().await {
            self.escalate(&request, AuthFailure::RefreshRejected);
            return Ok(response);
        }

        self.retry(request).await
    }

    async fn retry(&self, request: BackendRequest) -> Result<reqwest::Response, BackendError> {
        let Some(access) = self.store.get().await.map(|pair| pair.access) else {
            self.escalate(&request, AuthFailure::CredentialAbsent);
            return Err(BackendError::CredentialAbsent);
        };
        let response = self.backend.send(&request, &access).await?;
        if is_auth_failure(response.status()) {
            info!(path = %request.path, status = %response.status(), "Retried request still unauthorized");
            self.escalate(&request, AuthFailure::CredentialExpired);
        }
        Ok(response)
    }

    /// Login page target for a failed call made from `origin`.
    pub fn login_target(&self, origin: Option<&str>, failure: AuthFailure) -> String {
        self.redirects
            .login_target(&self.login_path, origin, Some(failure.reason()))
    }

    fn escalate(&self, request: &BackendRequest, failure: AuthFailure) {
        let location = self.login_target(request.origin.as_deref(), failure);
        self.events.escalate(location);
    }
}
