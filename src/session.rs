//! Local session tokens.
//!
//! The session proves the user went through interactive sign-in. It is a
//! stateless HS256 JWT in the `session` cookie, independent of the backend
//! token pair.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session duration: 30 days
pub const SESSION_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Minimum accepted secret length in bytes.
pub const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// JWT claims for a local session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session ID
    pub sid: String,
    /// Subject (user identifier from the sign-in provider)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of issuing a session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// The JWT token string
    pub token: String,
    /// Session ID
    pub sid: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Signing keys for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a session for a user who completed sign-in.
    pub fn issue(&self, subject: &str) -> Result<IssuedSession, SessionError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| SessionError::TimeError)?
            .as_secs();

        let sid = uuid::Uuid::new_v4().to_string();
        let claims = SessionClaims {
            sid: sid.clone(),
            sub: subject.to_string(),
            iat: now,
            exp: now + SESSION_DURATION_SECS,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(SessionError::Encoding)?;

        Ok(IssuedSession {
            token,
            sid,
            duration: SESSION_DURATION_SECS,
        })
    }

    /// Validate and decode a session token.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(SessionError::Decoding)
    }
}

/// Errors that can occur during session token operations.
#[derive(Debug)]
pub enum SessionError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Encoding(e) => write!(f, "Failed to encode session: {}", e),
            SessionError::Decoding(e) => write!(f, "Failed to decode session: {}", e),
            SessionError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for SessionError {}
