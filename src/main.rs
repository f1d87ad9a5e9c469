use autolot::cli::{
    Args, build_config, init_logging, load_session_secret, validate_app_origin, validate_url,
};
use autolot::events::AuthEvent;
use autolot::{AppState, ServerConfig, create_app};
use axum::Router;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Read while the process is still single-threaded
    let Some(session_secret) = load_session_secret(args.session_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(origin) = validate_app_origin(&args.app_origin) else {
        std::process::exit(1);
    };

    let Some(backend_url) = validate_url("backend-url", &args.backend_url) else {
        std::process::exit(1);
    };

    let token_cache_url = match args.token_cache_url.as_deref() {
        Some(url) => match validate_url("token-cache-url", url) {
            Some(url) => Some(url),
            None => std::process::exit(1),
        },
        None => None,
    };

    let config = build_config(origin, backend_url, token_cache_url, session_secret);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        });
    runtime.block_on(serve(config, args.port));
}

async fn serve(config: ServerConfig, port: u16) {
    let state = AppState::new(config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to initialize");
        std::process::exit(1);
    });

    spawn_event_logger(&state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => warn!(error = %e, "Could not read local address"),
    }

    let app = create_app(state, Router::new());
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Log auth state changes for operators.
fn spawn_event_logger(state: &AppState) {
    let mut events = state.coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::LoginRequired { location }) => {
                    info!(location = %location, "Backend login required")
                }
                Ok(AuthEvent::SignedIn) => info!("Backend tokens available"),
                Ok(AuthEvent::SignedOut) => info!("Backend tokens cleared"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Auth event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
