//! HTTP client for the token-issuing backend.
//!
//! Credentials travel as cookies, the same channel the backend uses for
//! browsers: `access_token` on business calls and `/whoami`, `refresh_token`
//! on `/refresh`.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::store::TokenPair;
use crate::auth::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};

/// Upper bound for any single backend call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of calling the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New tokens issued
    Success(TokenPair),
    /// Refresh token rejected (403)
    Rejected,
    /// Network error or unexpected status
    TransientFailure(String),
}

/// Result of the lightweight "who am I" probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    Unauthorized,
    Failed(String),
}

/// Token operations of the backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> RefreshOutcome;
    /// Check whether an access token is still accepted.
    async fn whoami(&self, access_token: &str) -> ProbeOutcome;
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
}

/// Outbound call to the backend, kept as plain data so it can be re-sent.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    /// Path relative to the backend base URL
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Application page that triggered the call, used as the login callback
    pub origin: Option<String>,
}

impl BackendRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            origin: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Record the page the user was on so a login detour can return there.
    pub fn from_page(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// reqwest-based client for the backend service.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base))
    }

    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        // Joining against a base without a trailing slash would drop its last segment.
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut base = base;
            let path = format!("{}/", base.path());
            base.set_path(&path);
            base
        };
        Self { client, base }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path.trim_start_matches('/'))
    }

    /// Send a business request carrying `access` as the credential.
    pub async fn send(
        &self,
        request: &BackendRequest,
        access: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let mut url = self.endpoint(&request.path)?;
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            url.set_query(Some(query));
        }

        let mut headers = request.headers.clone();
        headers.remove(COOKIE);
        if let Ok(value) = HeaderValue::from_str(&format!("{}={}", ACCESS_COOKIE_NAME, access)) {
            headers.insert(COOKIE, value);
        }

        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn refresh(&self, refresh_token: &str) -> RefreshOutcome {
        let url = match self.endpoint("refresh") {
            Ok(url) => url,
            Err(e) => return RefreshOutcome::TransientFailure(e.to_string()),
        };

        let response = match self
            .client
            .post(url)
            .header(COOKIE, format!("{}={}", REFRESH_COOKIE_NAME, refresh_token))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Refresh request failed");
                return RefreshOutcome::TransientFailure(e.to_string());
            }
        };

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            return RefreshOutcome::Rejected;
        }
        if !status.is_success() {
            return RefreshOutcome::TransientFailure(format!("refresh returned {}", status));
        }

        let body: RefreshResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return RefreshOutcome::TransientFailure(e.to_string()),
        };

        let Some(access) = body.access.filter(|a| !a.is_empty()) else {
            return RefreshOutcome::TransientFailure("refresh response had no access token".into());
        };

        let rotated = body.refresh.filter(|r| !r.is_empty());
        debug!(rotated = rotated.is_some(), "Backend issued new access token");
        let refresh = rotated.unwrap_or_else(|| refresh_token.to_string());
        RefreshOutcome::Success(TokenPair::new(access, refresh))
    }

    async fn whoami(&self, access_token: &str) -> ProbeOutcome {
        let url = match self.endpoint("whoami") {
            Ok(url) => url,
            Err(e) => return ProbeOutcome::Failed(e.to_string()),
        };

        match self
            .client
            .get(url)
            .header(COOKIE, format!("{}={}", ACCESS_COOKIE_NAME, access_token))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => ProbeOutcome::Valid,
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                ProbeOutcome::Unauthorized
            }
            Ok(response) => ProbeOutcome::Failed(format!("whoami returned {}", response.status())),
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        }
    }
}

/// Errors sending a business request.
#[derive(Debug)]
pub enum BackendError {
    /// The request path could not be joined onto the backend URL
    InvalidPath(url::ParseError),
    /// The backend could not be reached
    Transport(reqwest::Error),
    /// No token pair is stored, so nothing was sent
    CredentialAbsent,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::InvalidPath(e) => write!(f, "Invalid backend path: {}", e),
            BackendError::Transport(e) => write!(f, "Backend unreachable: {}", e),
            BackendError::CredentialAbsent => write!(f, "No backend tokens stored"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<url::ParseError> for BackendError {
    fn from(e: url::ParseError) -> Self {
        BackendError::InvalidPath(e)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e)
    }
}
