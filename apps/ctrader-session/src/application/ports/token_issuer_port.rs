//! Token Issuer Port (Driven Port)
//!
//! Interface for exchanging a refresh token for a new access token.

use std::fmt;

use async_trait::async_trait;

/// Refresh-token grant.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Refresh token to exchange.
    pub refresh_token: String,
    /// Application client id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Tokens returned by a successful refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// New access token.
    pub access_token: String,
    /// New refresh token, when the issuer rotated it.
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: Option<u64>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token refresh error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token is held.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The HTTP call failed.
    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The response did not carry an access token.
    #[error("token response missing access token (error code {error_code:?}: {description:?})")]
    MissingToken {
        /// Error code reported by the issuer.
        error_code: Option<String>,
        /// Error description reported by the issuer.
        description: Option<String>,
    },

    /// The response body was not valid JSON.
    #[error("invalid token response: {0}")]
    Decode(String),
}

/// Port for reissuing access tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, request: RefreshRequest) -> Result<IssuedToken, RefreshError>;
}
