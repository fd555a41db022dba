//! Session error taxonomy delivered to callers and the `error` event channel.

use std::time::Duration;

use crate::domain::market::SymbolId;
use crate::domain::session::ConnectionState;

/// Error returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session is not ready to accept requests.
    #[error("session not ready (state: {0})")]
    NotReady(ConnectionState),

    /// No response arrived before the request deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection dropped while the request was outstanding.
    #[error("session disconnected: {0}")]
    Disconnected(String),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue answered with a structured error.
    #[error("venue error {code}: {description}")]
    Protocol {
        /// Venue error code.
        code: String,
        /// Venue error description.
        description: String,
    },

    /// Token reissuance failed.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// Instrument name not present in the symbol cache.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Instrument id not present in the symbol cache.
    #[error("unknown symbol id: {0}")]
    UnknownSymbolId(SymbolId),

    /// The correlated response had an unexpected type.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Expected response kind.
        expected: String,
        /// Received response kind.
        actual: String,
    },

    /// The session loop has stopped.
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotReady(_) => "not_ready",
            Self::Timeout(_) => "timeout",
            Self::Disconnected(_) => "disconnected",
            Self::Transport(_) => "transport",
            Self::Protocol { .. } => "venue_error",
            Self::Refresh(_) => "refresh",
            Self::UnknownSymbol(_) | Self::UnknownSymbolId(_) => "unknown_symbol",
            Self::UnexpectedResponse { .. } => "unexpected_response",
            Self::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = SessionError::Protocol {
            code: "INVALID_REQUEST".into(),
            description: "bad symbol".into(),
        };
        assert_eq!(err.to_string(), "venue error INVALID_REQUEST: bad symbol");
        assert_eq!(
            SessionError::NotReady(ConnectionState::Connecting).to_string(),
            "session not ready (state: connecting)"
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(SessionError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(SessionError::Closed.kind(), "closed");
    }
}
