//! Session Domain Types
//!
//! The logical session with the venue: connection state, application
//! credentials, the configured trading account and the token pair.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ─► Connecting ─► AppAuthenticating ─► AppAuthenticated
//!                                                          │
//!                                                          ▼
//!     RefreshingToken ──────────────────────► AccountAuthenticating ─► Ready
//!           ▲                                                           │
//!           └───────────────────────────────────────────────────────────┘
//!
//! any state ─► Disconnected (transport loss)
//! ```
//!
//! Account authentication is never entered before the application has
//! been authorized.

use std::fmt;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a venue session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport connection.
    #[default]
    Disconnected,
    /// Transport connect in progress.
    Connecting,
    /// Application auth request sent, awaiting response.
    AppAuthenticating,
    /// Application authorized, account not yet authorized.
    AppAuthenticated,
    /// Account auth request sent, awaiting response.
    AccountAuthenticating,
    /// Access token reissuance in progress.
    RefreshingToken,
    /// Both application and account authorized; requests may be issued.
    Ready,
}

impl ConnectionState {
    /// Check whether ordinary requests may be issued.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check whether a transport connection exists or is being set up.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Check whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Disconnected)
                | (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::AppAuthenticating)
                | (Self::AppAuthenticating, Self::AppAuthenticated)
                | (
                    Self::AppAuthenticated | Self::RefreshingToken,
                    Self::AccountAuthenticating
                )
                | (Self::AccountAuthenticating, Self::Ready)
                | (
                    Self::AppAuthenticated | Self::AccountAuthenticating | Self::Ready,
                    Self::RefreshingToken
                )
                | (Self::RefreshingToken, Self::AppAuthenticated)
        )
    }

    /// Numeric code used for the session state gauge.
    #[must_use]
    pub const fn as_code(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::AppAuthenticating => 2,
            Self::AppAuthenticated => 3,
            Self::AccountAuthenticating => 4,
            Self::RefreshingToken => 5,
            Self::Ready => 6,
        }
    }

    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AppAuthenticating => "app_authenticating",
            Self::AppAuthenticated => "app_authenticated",
            Self::AccountAuthenticating => "account_authenticating",
            Self::RefreshingToken => "refreshing_token",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Open API application credentials.
///
/// The `Debug` implementation redacts the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    client_id: String,
    client_secret: String,
}

impl AppCredentials {
    /// Create new application credentials.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Get the application client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the application client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Access token plus the optional refresh token used to reissue it.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    access_token: String,
    refresh_token: Option<String>,
}

impl TokenPair {
    /// Create a token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }

    /// Current access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Current refresh token, if one is held.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Replace the access token, and the refresh token when the issuer rotated it.
    pub fn rotate(&mut self, access_token: String, refresh_token: Option<String>) {
        self.access_token = access_token;
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(token);
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

// =============================================================================
// Session
// =============================================================================

/// Error returned when a state change would violate the lifecycle ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct IllegalTransition {
    /// State the session was in.
    pub from: ConnectionState,
    /// State that was requested.
    pub to: ConnectionState,
}

/// One logical connection attempt with the venue.
///
/// Created on startup and recreated after every disconnect. Tokens are
/// carried over into the next session by the owner.
#[derive(Debug, Clone)]
pub struct Session {
    state: ConnectionState,
    credentials: AppCredentials,
    account_id: i64,
    authorized_account_id: Option<i64>,
    tokens: TokenPair,
    app_authorized: bool,
    account_authorized: bool,
}

impl Session {
    /// Create a fresh, disconnected session.
    #[must_use]
    pub const fn new(credentials: AppCredentials, account_id: i64, tokens: TokenPair) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            credentials,
            account_id,
            authorized_account_id: None,
            tokens,
            app_authorized: false,
            account_authorized: false,
        }
    }

    /// Recreate this session in the disconnected state, keeping credentials and tokens.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self::new(self.credentials.clone(), self.account_id, self.tokens.clone())
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, rejecting transitions that skip a step.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] if `next` is not a legal successor.
    pub const fn transition(&mut self, next: ConnectionState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        match next {
            ConnectionState::Disconnected => {
                self.app_authorized = false;
                self.account_authorized = false;
                self.authorized_account_id = None;
            }
            ConnectionState::AppAuthenticated => self.app_authorized = true,
            ConnectionState::RefreshingToken | ConnectionState::AccountAuthenticating => {
                self.account_authorized = false;
            }
            _ => {}
        }
        self.state = next;
        Ok(())
    }

    /// Record the venue-assigned account id and enter `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless account authentication was in progress.
    pub const fn mark_account_authorized(
        &mut self,
        venue_account_id: i64,
    ) -> Result<(), IllegalTransition> {
        match self.transition(ConnectionState::Ready) {
            Ok(()) => {
                self.account_authorized = true;
                self.authorized_account_id = Some(venue_account_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Application credentials.
    #[must_use]
    pub const fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }

    /// Configured trading account id.
    #[must_use]
    pub const fn account_id(&self) -> i64 {
        self.account_id
    }

    /// Account id echoed by the venue on successful account auth.
    #[must_use]
    pub const fn authorized_account_id(&self) -> Option<i64> {
        self.authorized_account_id
    }

    /// Account id to place on outbound account-scoped requests.
    #[must_use]
    pub fn request_account_id(&self) -> i64 {
        self.authorized_account_id.unwrap_or(self.account_id)
    }

    /// Current token pair.
    #[must_use]
    pub const fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    /// Mutable access to the token pair (refresh flow).
    pub const fn tokens_mut(&mut self) -> &mut TokenPair {
        &mut self.tokens
    }

    /// Whether the application has been authorized on this connection.
    #[must_use]
    pub const fn is_app_authorized(&self) -> bool {
        self.app_authorized
    }

    /// Whether the account has been authorized on this connection.
    #[must_use]
    pub const fn is_account_authorized(&self) -> bool {
        self.account_authorized
    }
}
