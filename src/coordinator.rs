//! The authentication coordinator.
//!
//! Built once at start-up and shared by reference with every handler and
//! middleware. It owns the token store, the single-flight refresher, the
//! status cache, the request interceptor, the route gate and the event
//! channel.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};
use url::Url;

use crate::events::{AuthEvent, AuthEvents};
use crate::gate::{Admission, LOGIN_PATH, RouteGate, RouteTable};
use crate::redirect::RedirectManager;
use crate::tokens::{
    AuthBackend, AuthState, AuthStatusCache, BackendError, BackendRequest, HttpBackend,
    RefreshCoordinator, RequestInterceptor, StoreError, TokenPair, TokenStore,
};

pub struct AuthCoordinator {
    store: Arc<dyn TokenStore>,
    refresher: RefreshCoordinator,
    status: AuthStatusCache,
    interceptor: RequestInterceptor,
    gate: RouteGate,
    events: AuthEvents,
    redirects: RedirectManager,
}

impl AuthCoordinator {
    /// Coordinator with the default route table.
    pub fn new(store: Arc<dyn TokenStore>, backend: Arc<HttpBackend>, origin: Url) -> Self {
        Self::with_route_table(store, backend, origin, RouteTable::default())
    }

    pub fn with_route_table(
        store: Arc<dyn TokenStore>,
        backend: Arc<HttpBackend>,
        origin: Url,
        table: RouteTable,
    ) -> Self {
        let auth_backend: Arc<dyn AuthBackend> = backend.clone();
        let events = AuthEvents::new();
        let redirects = RedirectManager::new(origin);
        let refresher = RefreshCoordinator::new(store.clone(), auth_backend.clone());
        let status = AuthStatusCache::new(store.clone(), auth_backend);
        let interceptor = RequestInterceptor::new(
            backend,
            store.clone(),
            refresher.clone(),
            events.clone(),
            redirects.clone(),
            LOGIN_PATH,
        );
        let gate = RouteGate::new(table, store.clone(), redirects.clone());

        Self {
            store,
            refresher,
            status,
            interceptor,
            gate,
            events,
            redirects,
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn redirects(&self) -> &RedirectManager {
        &self.redirects
    }

    pub fn interceptor(&self) -> &RequestInterceptor {
        &self.interceptor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Single-flight refresh of the backend token pair.
    pub async fn refresh(&self) -> bool {
        self.refresher.refresh().await
    }

    /// Authenticated backend call with refresh-and-retry.
    pub async fn execute(
        &self,
        request: BackendRequest,
    ) -> Result<reqwest::Response, BackendError> {
        self.interceptor.execute(request).await
    }

    /// Cached credential status.
    pub async fn status(&self, force_refresh: bool) -> AuthState {
        self.status.check(force_refresh).await
    }

    /// Admission decision for a page navigation.
    pub async fn admit(&self, target: &str, has_session: bool) -> Admission {
        self.gate.admit(target, has_session).await
    }

    /// Store the pair handed over by the login flow.
    pub async fn complete_login(&self, pair: TokenPair) -> Result<(), StoreError> {
        self.store.set(&pair).await?;
        self.status.invalidate().await;
        self.events.signed_in();
        info!("Backend tokens stored after login");
        Ok(())
    }

    /// Clear the backend tokens. The cached status is dropped even if the
    /// store could not be cleared.
    pub async fn logout(&self) -> Result<(), StoreError> {
        let result = self.store.delete().await;
        self.status.invalidate().await;
        match &result {
            Ok(()) => {
                self.events.signed_out();
                info!("Backend tokens cleared");
            }
            Err(e) => error!(error = %e, "Failed to clear backend tokens"),
        }
        result
    }
}
