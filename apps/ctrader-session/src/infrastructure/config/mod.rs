//! Configuration Module
//!
//! Configuration loading for the session service.

mod settings;

pub use settings::{
    AppMode, ConfigError, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TOKEN_URL, MarketDataSettings,
    ReconnectSettings, ServerSettings, SessionConfig, VenueSettings, parse_watchlist,
};
