pub mod api;
pub mod auth;
pub mod cli;
pub mod coordinator;
pub mod events;
pub mod gate;
pub mod redirect;
pub mod session;
pub mod tokens;

use api::create_api_router;
use auth::HasAuthState;
use axum::{Router, middleware, routing::get};
use coordinator::AuthCoordinator;
use gate::{RouteTable, route_gate};
use session::SessionKeys;
use std::net::SocketAddr;
use std::sync::Arc;
use tokens::{HttpBackend, HttpTokenStore, MemoryTokenStore, TokenStore};
use tokio::net::TcpListener;
use tracing::info;
use url::Url;

pub struct ServerConfig {
    /// Public origin of the application, used to validate callback URLs
    pub origin: Url,
    /// Base URL of the token-issuing backend
    pub backend_url: Url,
    /// Shared token cache service. Tokens are kept in memory when unset
    pub token_cache_url: Option<Url>,
    /// Secret for signing session tokens
    pub session_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Page admission rules
    pub routes: RouteTable,
}

/// Errors building the application state.
#[derive(Debug)]
pub enum StartupError {
    HttpClient(reqwest::Error),
    TokenCacheUrl(url::ParseError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::HttpClient(e) => write!(f, "Failed to build HTTP client: {}", e),
            StartupError::TokenCacheUrl(e) => write!(f, "Invalid token cache URL: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

/// State shared by every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionKeys>,
    pub coordinator: Arc<AuthCoordinator>,
    pub secure_cookies: bool,
}

impl HasAuthState for AppState {
    fn sessions(&self) -> &SessionKeys {
        &self.sessions
    }

    fn coordinator(&self) -> &AuthCoordinator {
        &self.coordinator
    }

    fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, StartupError> {
        let backend =
            Arc::new(HttpBackend::new(config.backend_url).map_err(StartupError::HttpClient)?);

        let store: Arc<dyn TokenStore> = match &config.token_cache_url {
            Some(url) => {
                info!(url = %url, "Using shared token cache");
                Arc::new(
                    HttpTokenStore::new(backend.client().clone(), url)
                        .map_err(StartupError::TokenCacheUrl)?,
                )
            }
            None => {
                info!("No token cache configured, keeping backend tokens in memory");
                Arc::new(MemoryTokenStore::new())
            }
        };

        let coordinator =
            AuthCoordinator::with_route_table(store, backend, config.origin, config.routes);

        Ok(Self {
            sessions: Arc::new(SessionKeys::new(&config.session_secret)),
            coordinator: Arc::new(coordinator),
            secure_cookies: config.secure_cookies,
        })
    }
}

/// Create the application router. `pages` renders the application pages;
/// every request passes the route gate first.
pub fn create_app(state: AppState, pages: Router) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", create_api_router(state.clone()))
        .merge(pages)
        .layer(middleware::from_fn_with_state(
            state,
            route_gate::<AppState>,
        ))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(
    state: AppState,
    pages: Router,
    listener: TcpListener,
) -> Result<(), std::io::Error> {
    let app = create_app(state, pages);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    state: AppState,
    pages: Router,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(state, pages, listener).await.ok();
    });

    Ok((handle, local_addr))
}
