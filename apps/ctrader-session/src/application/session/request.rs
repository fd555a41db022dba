//! Typed venue requests and responses issued through the correlator.

use std::fmt;

use crate::domain::market::{RawTrendbar, SymbolId, TrendbarPeriod};
use crate::domain::symbols::SymbolListing;

/// Request kind, used to match a correlated response and to label metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Light symbol list.
    SymbolsList,
    /// Spot subscription.
    SubscribeSpots,
    /// Spot unsubscription.
    UnsubscribeSpots,
    /// Historical trendbars.
    Trendbars,
}

impl RequestKind {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SymbolsList => "symbols_list",
            Self::SubscribeSpots => "subscribe_spots",
            Self::UnsubscribeSpots => "unsubscribe_spots",
            Self::Trendbars => "trendbars",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request an upstream consumer may send once the session is ready.
///
/// The account id is filled in by the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueRequest {
    /// List all light symbols of the account.
    SymbolsList {
        /// Include archived symbols.
        include_archived: bool,
    },
    /// Subscribe to spot ticks.
    SubscribeSpots {
        /// Instruments to subscribe.
        symbol_ids: Vec<SymbolId>,
    },
    /// Unsubscribe from spot ticks.
    UnsubscribeSpots {
        /// Instruments to unsubscribe.
        symbol_ids: Vec<SymbolId>,
    },
    /// Historical bars for one instrument.
    Trendbars {
        /// Instrument.
        symbol_id: SymbolId,
        /// Bar period.
        period: TrendbarPeriod,
        /// Range start, milliseconds since the epoch.
        from_ms: i64,
        /// Range end, milliseconds since the epoch.
        to_ms: i64,
        /// Maximum number of bars.
        count: Option<u32>,
    },
}

impl VenueRequest {
    /// Kind of this request.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::SymbolsList { .. } => RequestKind::SymbolsList,
            Self::SubscribeSpots { .. } => RequestKind::SubscribeSpots,
            Self::UnsubscribeSpots { .. } => RequestKind::UnsubscribeSpots,
            Self::Trendbars { .. } => RequestKind::Trendbars,
        }
    }
}

/// Decoded response to a [`VenueRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueResponse {
    /// Light symbol list.
    SymbolsList(Vec<SymbolListing>),
    /// Spot subscription acknowledged.
    SubscribeSpots,
    /// Spot unsubscription acknowledged.
    UnsubscribeSpots,
    /// Historical bars.
    Trendbars {
        /// Instrument, when echoed by the venue.
        symbol_id: Option<SymbolId>,
        /// Bar period as a venue enum value.
        period: i32,
        /// Raw bars in venue order.
        bars: Vec<RawTrendbar>,
    },
}

impl VenueResponse {
    /// Kind of request this responds to.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::SymbolsList(_) => RequestKind::SymbolsList,
            Self::SubscribeSpots => RequestKind::SubscribeSpots,
            Self::UnsubscribeSpots => RequestKind::UnsubscribeSpots,
            Self::Trendbars { .. } => RequestKind::Trendbars,
        }
    }
}

/// Structured error response from the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueError {
    /// Venue error code (e.g. `INVALID_REQUEST`).
    pub code: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Account the error refers to, when reported.
    pub account_id: Option<i64>,
}

impl VenueError {
    /// Whether this error means the account token is no longer accepted
    /// and a token refresh should be attempted.
    ///
    /// The venue reports this either as `CH_ACCESS_TOKEN_INVALID` or as
    /// `INVALID_REQUEST` with a "not authorized" description.
    #[must_use]
    pub fn requires_token_refresh(&self) -> bool {
        if self.code == "CH_ACCESS_TOKEN_INVALID" {
            return true;
        }
        self.code == "INVALID_REQUEST"
            && self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains("not authorized"))
    }
}

impl fmt::Display for VenueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {description}", self.code),
            None => f.write_str(&self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn error(code: &str, description: Option<&str>) -> VenueError {
        VenueError {
            code: code.to_string(),
            description: description.map(str::to_string),
            account_id: None,
        }
    }

    #[test_case("INVALID_REQUEST", Some("Trading account is not authorized"), true ; "phrase")]
    #[test_case("INVALID_REQUEST", Some("Account NOT AUTHORIZED"), true ; "phrase any case")]
    #[test_case("CH_ACCESS_TOKEN_INVALID", None, true ; "structured code")]
    #[test_case("INVALID_REQUEST", Some("Malformed symbol id"), false ; "other invalid request")]
    #[test_case("INVALID_REQUEST", None, false ; "no description")]
    #[test_case("CH_CLIENT_AUTH_FAILURE", Some("not authorized"), false ; "different code")]
    fn refresh_trigger(code: &str, description: Option<&str>, expected: bool) {
        assert_eq!(error(code, description).requires_token_refresh(), expected);
    }

    #[test]
    fn request_and_response_kinds_match() {
        let request = VenueRequest::SubscribeSpots {
            symbol_ids: vec![1],
        };
        assert_eq!(request.kind(), VenueResponse::SubscribeSpots.kind());
        assert_eq!(request.kind().as_str(), "subscribe_spots");
    }

    #[test]
    fn venue_error_display() {
        assert_eq!(
            error("INVALID_REQUEST", Some("bad")).to_string(),
            "INVALID_REQUEST: bad"
        );
        assert_eq!(error("X", None).to_string(), "X");
    }
}
