//! Backend token pair storage.
//!
//! The pair lives in a shared cache outside this process. Reads fail closed:
//! any transport or decode problem is reported as "no tokens".

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Logical cache key holding the serialized pair.
pub const TOKEN_CACHE_KEY: &str = "backend_auth";

/// Backend access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// Unix milliseconds
    pub issued_at: u64,
}

/// Wire form of a stored pair. Both tokens are optional here so that a
/// half-written entry can be detected and discarded.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPair {
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(rename = "issuedAt", default)]
    issued_at: u64,
}

impl TokenPair {
    /// Create a pair stamped with the current time.
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
            issued_at: now_millis(),
        }
    }

    /// Decode a stored pair. A pair without a refresh token is no pair at all.
    pub fn from_json(raw: &str) -> Option<Self> {
        let stored: StoredPair = serde_json::from_str(raw).ok()?;
        Self::from_stored(stored)
    }

    pub fn to_json(&self) -> String {
        let stored = StoredPair {
            access: Some(self.access.clone()),
            refresh: Some(self.refresh.clone()),
            issued_at: self.issued_at,
        };
        // Serializing two strings and an integer cannot fail.
        serde_json::to_string(&stored).unwrap_or_default()
    }

    fn from_stored(stored: StoredPair) -> Option<Self> {
        let refresh = stored.refresh.filter(|r| !r.is_empty())?;
        Some(Self {
            access: stored.access.unwrap_or_default(),
            refresh,
            issued_at: stored.issued_at,
        })
    }

    /// Whether the pair is usable. Used by in-process stores to apply the
    /// same absent-refresh rule as the wire decoder.
    fn is_complete(&self) -> bool {
        !self.refresh.is_empty()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Errors from writing to or clearing the token cache.
#[derive(Debug)]
pub enum StoreError {
    /// The cache could not be reached
    Transport(reqwest::Error),
    /// The cache answered with a non-success status
    Status(u16),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Transport(e) => write!(f, "Token cache unreachable: {}", e),
            StoreError::Status(code) => write!(f, "Token cache returned status {}", code),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e)
    }
}

/// Get/set/delete contract for the backend token pair.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current pair, or `None` when absent or unreadable.
    async fn get(&self) -> Option<TokenPair>;
    async fn set(&self, pair: &TokenPair) -> Result<(), StoreError>;
    async fn delete(&self) -> Result<(), StoreError>;
}

// =============================================================================
// HTTP cache store
// =============================================================================

#[derive(Debug, Deserialize)]
struct CacheEntry {
    exists: bool,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CacheWrite<'a> {
    key: &'a str,
    value: String,
}

/// Token store backed by the shared cache's `/token-cache` endpoint.
pub struct HttpTokenStore {
    client: reqwest::Client,
    endpoint: Url,
    key: String,
}

impl HttpTokenStore {
    /// `base` is the cache service root, e.g. `http://127.0.0.1:6380/`.
    pub fn new(client: reqwest::Client, base: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: base.join("token-cache")?,
            key: TOKEN_CACHE_KEY.to_string(),
        })
    }

    async fn fetch(&self) -> Result<Option<TokenPair>, reqwest::Error> {
        let entry: CacheEntry = self
            .client
            .get(self.endpoint.clone())
            .query(&[("key", self.key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !entry.exists {
            return Ok(None);
        }

        // The cache stores a JSON string; tolerate caches that hand back the
        // decoded object instead.
        let pair = match entry.value {
            Some(serde_json::Value::String(raw)) => TokenPair::from_json(&raw),
            Some(value @ serde_json::Value::Object(_)) => serde_json::from_value::<StoredPair>(value)
                .ok()
                .and_then(TokenPair::from_stored),
            _ => None,
        };
        Ok(pair)
    }
}

#[async_trait]
impl TokenStore for HttpTokenStore {
    async fn get(&self) -> Option<TokenPair> {
        match self.fetch().await {
            Ok(pair) => {
                if pair.is_none() {
                    debug!(key = %self.key, "No backend tokens in cache");
                }
                pair
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Token cache read failed, treating as absent");
                None
            }
        }
    }

    async fn set(&self, pair: &TokenPair) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.endpoint.clone())
            .json(&CacheWrite {
                key: &self.key,
                value: pair.to_json(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.endpoint.clone())
            .query(&[("key", self.key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::Status(status.as_u16()));
        }
        Ok(())
    }
}

// =============================================================================
// In-process store
// =============================================================================

/// Process-local token store for single-node deployments.
#[derive(Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Option<TokenPair> {
        self.pair
            .read()
            .await
            .as_ref()
            .filter(|p| p.is_complete())
            .cloned()
    }

    async fn set(&self, pair: &TokenPair) -> Result<(), StoreError> {
        *self.pair.write().await = Some(pair.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        *self.pair.write().await = None;
        Ok(())
    }
}
