//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::gate::RouteTable;
use crate::session::MIN_SESSION_SECRET_LENGTH;
use clap::Parser;
use tracing::error;
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Autolot",
    about = "Session and backend token coordination for the Autolot web app"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "7291")]
    pub port: u16,

    /// Public origin of the application (e.g., "https://autolot.example")
    #[arg(long, env = "APP_ORIGIN", default_value = "http://localhost:7291")]
    pub app_origin: String,

    /// Base URL of the backend API that issues access and refresh tokens
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: String,

    /// Base URL of the shared token cache. Tokens are kept in memory when unset
    #[arg(long, env = "TOKEN_CACHE_URL")]
    pub token_cache_url: Option<String>,

    /// Path to file containing the session secret. Prefer using SESSION_SECRET env var instead
    #[arg(long)]
    pub session_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the session secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
///
/// Must run before any other thread is started.
pub fn load_session_secret(session_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("SESSION_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: Called from `main` before the async runtime is built, so
        // no other thread exists to read or write the environment.
        unsafe { std::env::remove_var("SESSION_SECRET") };
        secret
    } else if let Some(path) = session_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read session secret file");
                return None;
            }
        }
    } else {
        error!(
            "Session secret is required. Set SESSION_SECRET environment variable (recommended) or use --session-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_SESSION_SECRET_LENGTH {
        error!(
            "Session secret is shorter than {} characters. Use a longer secret",
            MIN_SESSION_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the application origin.
/// Returns None and logs an error if validation fails.
pub fn validate_app_origin(app_origin: &str) -> Option<Url> {
    let url = validate_url("app-origin", app_origin)?;

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("app-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Parse an http(s) service URL.
/// Returns None and logs an error if validation fails.
pub fn validate_url(name: &str, value: &str) -> Option<Url> {
    let url = match Url::parse(value) {
        Ok(url) => url,
        Err(e) => {
            error!(option = %name, url = %value, error = %e, "Invalid URL");
            return None;
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        error!(option = %name, url = %value, "URL must use http or https");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    origin: Url,
    backend_url: Url,
    token_cache_url: Option<Url>,
    session_secret: String,
) -> ServerConfig {
    let secure_cookies = origin.scheme() == "https";

    ServerConfig {
        origin,
        backend_url,
        token_cache_url,
        session_secret: session_secret.into_bytes(),
        secure_cookies,
        routes: RouteTable::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_requires_https_off_localhost() {
        assert!(validate_app_origin("http://localhost:7291").is_some());
        assert!(validate_app_origin("https://autolot.example").is_some());
        assert!(validate_app_origin("http://autolot.example").is_none());
        assert!(validate_app_origin("not a url").is_none());
    }

    #[test]
    fn test_service_url_scheme() {
        assert!(validate_url("backend-url", "http://10.0.0.5:8080/api").is_some());
        assert!(validate_url("backend-url", "ftp://10.0.0.5").is_none());
    }

    #[test]
    fn test_secure_cookies_follow_origin() {
        let config = build_config(
            Url::parse("https://autolot.example").unwrap(),
            Url::parse("http://backend:8080").unwrap(),
            None,
            "x".repeat(32),
        );
        assert!(config.secure_cookies);
        assert!(config.token_cache_url.is_none());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "autolot",
            "--backend-url",
            "http://backend:8080",
            "--token-cache-url",
            "http://cache:9000",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.backend_url, "http://backend:8080");
        assert_eq!(args.token_cache_url.as_deref(), Some("http://cache:9000"));
        assert!(matches!(args.log_format, LogFormat::Json));
    }
}
