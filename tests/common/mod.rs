#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autolot::auth::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use autolot::coordinator::AuthCoordinator;
use autolot::gate::RouteTable;
use autolot::session::SessionKeys;
use autolot::tokens::{HttpBackend, MemoryTokenStore, TokenPair, TokenStore};
use autolot::{AppState, ServerConfig};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use url::Url;

pub const TEST_SECRET: &[u8] = b"test-session-secret-0123456789abcdef";

pub const APP_ORIGIN: &str = "http://localhost:7291";

/// Refresh token the mock backend accepts.
pub const REFRESH_TOKEN: &str = "refresh-1";

/// Access token the mock backend no longer accepts.
pub const STALE_ACCESS: &str = "access-0";

/// Serve `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    Url::parse(&format!("http://{}/", addr)).expect("Invalid URL")
}

// =============================================================================
// Mock backend
// =============================================================================

/// Counters and knobs of the mock backend.
pub struct BackendState {
    pub refresh_calls: AtomicUsize,
    pub whoami_calls: AtomicUsize,
    pub business_calls: AtomicUsize,
    refresh_status: AtomicU16,
    refresh_delay_ms: AtomicU64,
    issued: AtomicUsize,
    reject_all: AtomicBool,
    valid_access: Mutex<Option<String>>,
}

impl BackendState {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn business_calls(&self) -> usize {
        self.business_calls.load(Ordering::SeqCst)
    }

    pub fn whoami_calls(&self) -> usize {
        self.whoami_calls.load(Ordering::SeqCst)
    }

    /// Status the refresh endpoint answers with. 200 issues a new token.
    pub fn set_refresh_status(&self, status: u16) {
        self.refresh_status.store(status, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make the backend accept `access`.
    pub fn accept(&self, access: &str) {
        *self.valid_access.lock().unwrap() = Some(access.to_string());
    }

    /// Reject every access token, including freshly issued ones.
    pub fn set_reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    fn is_valid(&self, headers: &HeaderMap) -> bool {
        if self.reject_all.load(Ordering::SeqCst) {
            return false;
        }
        let valid = self.valid_access.lock().unwrap();
        match (get_cookie(headers, ACCESS_COOKIE_NAME), valid.as_deref()) {
            (Some(sent), Some(valid)) => sent == valid,
            _ => false,
        }
    }
}

pub struct MockBackend {
    pub url: Url,
    pub state: Arc<BackendState>,
}

impl MockBackend {
    /// Backend that rejects every access token until a refresh succeeds.
    pub async fn start() -> Self {
        let state = Arc::new(BackendState {
            refresh_calls: AtomicUsize::new(0),
            whoami_calls: AtomicUsize::new(0),
            business_calls: AtomicUsize::new(0),
            refresh_status: AtomicU16::new(200),
            refresh_delay_ms: AtomicU64::new(100),
            issued: AtomicUsize::new(0),
            reject_all: AtomicBool::new(false),
            valid_access: Mutex::new(None),
        });

        let router = Router::new()
            .route("/refresh", post(mock_refresh))
            .route("/whoami", get(mock_whoami))
            .route("/ads/{id}", any(mock_ad))
            .with_state(state.clone());

        let url = serve(router).await;
        Self { url, state }
    }

    pub fn client(&self) -> Arc<HttpBackend> {
        Arc::new(HttpBackend::new(self.url.clone()).expect("Failed to build client"))
    }
}

async fn mock_refresh(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let status = state.refresh_status.load(Ordering::SeqCst);
    if status != 200 {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return status.into_response();
    }
    if get_cookie(&headers, REFRESH_COOKIE_NAME) != Some(REFRESH_TOKEN) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let access = format!("access-{}", n);
    state.accept(&access);
    Json(serde_json::json!({ "access": access })).into_response()
}

async fn mock_whoami(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.whoami_calls.fetch_add(1, Ordering::SeqCst);
    if state.is_valid(&headers) {
        Json(serde_json::json!({ "authenticated": true })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn mock_ad(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.business_calls.fetch_add(1, Ordering::SeqCst);
    if state.is_valid(&headers) {
        Json(serde_json::json!({ "id": id, "title": "2019 Skoda Octavia" })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

// =============================================================================
// Mock token cache
// =============================================================================

pub struct CacheState {
    pub entries: Mutex<HashMap<String, String>>,
    pub failing: AtomicBool,
}

pub struct MockCache {
    pub url: Url,
    pub state: Arc<CacheState>,
}

#[derive(Deserialize)]
struct KeyQuery {
    key: String,
}

#[derive(Deserialize)]
struct CacheWrite {
    key: String,
    value: String,
}

impl MockCache {
    pub async fn start() -> Self {
        let state = Arc::new(CacheState {
            entries: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        });

        let router = Router::new()
            .route(
                "/token-cache",
                get(cache_get).put(cache_put).delete(cache_delete),
            )
            .with_state(state.clone());

        let url = serve(router).await;
        Self { url, state }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.entries.lock().unwrap().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.state
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }
}

async fn cache_get(State(state): State<Arc<CacheState>>, Query(query): Query<KeyQuery>) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let value = state.entries.lock().unwrap().get(&query.key).cloned();
    Json(serde_json::json!({ "exists": value.is_some(), "value": value })).into_response()
}

async fn cache_put(State(state): State<Arc<CacheState>>, Json(write): Json<CacheWrite>) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    state.entries.lock().unwrap().insert(write.key, write.value);
    StatusCode::NO_CONTENT.into_response()
}

async fn cache_delete(
    State(state): State<Arc<CacheState>>,
    Query(query): Query<KeyQuery>,
) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match state.entries.lock().unwrap().remove(&query.key) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// =============================================================================
// Application helpers
// =============================================================================

/// Pair the mock backend will refresh but not accept as-is.
pub fn stale_pair() -> TokenPair {
    TokenPair::new(STALE_ACCESS, REFRESH_TOKEN)
}

pub fn memory_store(pair: Option<TokenPair>) -> Arc<dyn TokenStore> {
    match pair {
        Some(pair) => Arc::new(MemoryTokenStore::with_pair(pair)),
        None => Arc::new(MemoryTokenStore::new()),
    }
}

pub fn coordinator(backend: &MockBackend, store: Arc<dyn TokenStore>) -> AuthCoordinator {
    AuthCoordinator::new(
        store,
        backend.client(),
        Url::parse(APP_ORIGIN).expect("Invalid URL"),
    )
}

/// Application state over the mock backend, optionally with the mock cache.
pub fn app_state(backend: &MockBackend, cache: Option<&MockCache>) -> AppState {
    AppState::new(ServerConfig {
        origin: Url::parse(APP_ORIGIN).expect("Invalid URL"),
        backend_url: backend.url.clone(),
        token_cache_url: cache.map(|c| c.url.clone()),
        session_secret: TEST_SECRET.to_vec(),
        secure_cookies: false,
        routes: RouteTable::default(),
    })
    .expect("Failed to build state")
}

/// Cookie header carrying a valid session.
pub fn session_cookie() -> String {
    let issued = SessionKeys::new(TEST_SECRET)
        .issue("seller-17")
        .expect("Failed to issue session");
    format!("session={}", issued.token)
}
