mod auth;
mod backend;
mod error;

use axum::Router;

use crate::AppState;

pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/backend", backend::router(state))
}
