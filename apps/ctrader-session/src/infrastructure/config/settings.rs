//! Session Configuration Settings
//!
//! Configuration types for the venue session, loaded from environment
//! variables.

use std::time::Duration;

use crate::application::ports::Endpoint;
use crate::domain::session::{AppCredentials, TokenPair};

/// Default Open API host (demo environment).
pub const DEFAULT_HOST: &str = "demo.ctraderapi.com";

/// Default Open API port.
pub const DEFAULT_PORT: u16 = 5035;

/// Default token reissuance endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://connect.spotware.com/apps/token";

/// Which market data services run once the session is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    /// Load symbols and subscribe to the watchlist.
    #[default]
    Full,
    /// Load symbols only; no spot subscriptions.
    Light,
}

impl AppMode {
    /// Parse mode from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "light" => Self::Light,
            _ => Self::Full,
        }
    }

    /// Whether spot subscriptions are enabled.
    #[must_use]
    pub const fn subscribes(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Light => "light",
        }
    }
}

/// Venue connection settings.
#[derive(Debug, Clone)]
pub struct VenueSettings {
    /// Open API host.
    pub host: String,
    /// Open API port.
    pub port: u16,
    /// Default per-request deadline.
    pub request_timeout: Duration,
    /// Interval between outbound heartbeats.
    pub heartbeat_interval: Duration,
    /// Inbound silence before the connection is considered dead.
    pub heartbeat_timeout: Duration,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
        }
    }
}

impl VenueSettings {
    /// Endpoint to connect to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}

/// Market data service settings.
#[derive(Debug, Clone)]
pub struct MarketDataSettings {
    /// Instruments to subscribe once ready.
    pub watchlist: Vec<String>,
    /// Spacing between consecutive subscription requests.
    pub subscribe_interval: Duration,
    /// Which services run.
    pub mode: AppMode,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            subscribe_interval: Duration::from_millis(200),
            mode: AppMode::Full,
        }
    }
}

/// Supervisor restart settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Delay before the first restart.
    pub initial_delay: Duration,
    /// Maximum delay between restarts.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Maximum restarts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete session service configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application credentials.
    pub credentials: AppCredentials,
    /// Configured trading account id.
    pub account_id: i64,
    /// Initial token pair.
    pub tokens: TokenPair,
    /// Token reissuance URL.
    pub token_url: String,
    /// Venue connection settings.
    pub venue: VenueSettings,
    /// Market data settings.
    pub market_data: MarketDataSettings,
    /// Supervisor restart settings.
    pub reconnect: ReconnectSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl SessionConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, empty or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, empty or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let client_id = env.required("CT_CLIENT_ID")?;
        let client_secret = env.required("CT_CLIENT_SECRET")?;
        let access_token = env.required("CTRADER_ACCESS_TOKEN")?;
        let account_raw = env.required("DEMO_ACCOUNT_ID")?;
        let account_id = account_raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "DEMO_ACCOUNT_ID".to_string(),
                value: account_raw.clone(),
            })?;

        let refresh_token = env.get("CTRADER_REFRESH_TOKEN");
        let token_url = env
            .get("CTRADER_TOKEN_URL")
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        let defaults = VenueSettings::default();
        let venue = VenueSettings {
            host: env.get("CTRADER_HOST").unwrap_or(defaults.host),
            port: env.parse_or("CTRADER_PORT", defaults.port),
            request_timeout: env.secs_or("CTRADER_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            heartbeat_interval: env
                .secs_or("CTRADER_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            heartbeat_timeout: env
                .secs_or("CTRADER_HEARTBEAT_TIMEOUT_SECS", defaults.heartbeat_timeout),
        };

        let defaults = MarketDataSettings::default();
        let market_data = MarketDataSettings {
            watchlist: env
                .get("CTRADER_WATCHLIST")
                .map(|list| parse_watchlist(&list))
                .unwrap_or_default(),
            subscribe_interval: env
                .millis_or("CTRADER_SUBSCRIBE_INTERVAL_MS", defaults.subscribe_interval),
            mode: env
                .get("APP_MODE")
                .map(|s| AppMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            initial_delay: env
                .millis_or("SESSION_RECONNECT_DELAY_INITIAL_MS", defaults.initial_delay),
            max_delay: env.secs_or("SESSION_RECONNECT_DELAY_MAX_SECS", defaults.max_delay),
            multiplier: env.parse_or("SESSION_RECONNECT_DELAY_MULTIPLIER", defaults.multiplier),
            max_attempts: env.parse_or("SESSION_MAX_RECONNECT_ATTEMPTS", defaults.max_attempts),
        };

        let server = ServerSettings {
            health_port: env.parse_or("SESSION_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            credentials: AppCredentials::new(client_id, client_secret),
            account_id,
            tokens: TokenPair::new(access_token, refresh_token),
            token_url,
            venue,
            market_data,
            reconnect,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Split a comma separated watchlist, dropping blanks and duplicates.
#[must_use]
pub fn parse_watchlist(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis_or(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("CT_CLIENT_ID", "client"),
        ("CT_CLIENT_SECRET", "secret"),
        ("DEMO_ACCOUNT_ID", "12345"),
        ("CTRADER_ACCESS_TOKEN", "access"),
    ];

    #[test]
    fn defaults_applied() {
        let config = SessionConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.account_id, 12345);
        assert_eq!(config.venue.host, DEFAULT_HOST);
        assert_eq!(config.venue.port, DEFAULT_PORT);
        assert_eq!(config.venue.request_timeout, Duration::from_secs(30));
        assert_eq!(config.market_data.subscribe_interval, Duration::from_millis(200));
        assert_eq!(config.market_data.mode, AppMode::Full);
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.tokens.refresh_token(), None);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn overrides_applied() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("CTRADER_REFRESH_TOKEN", "refresh"),
            ("CTRADER_HOST", "live.ctraderapi.com"),
            ("CTRADER_PORT", "5036"),
            ("CTRADER_WATCHLIST", "EURUSD, gbpusd,,EURUSD"),
            ("APP_MODE", "LIGHT"),
            ("SESSION_MAX_RECONNECT_ATTEMPTS", "5"),
        ]);
        let config = SessionConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.tokens.refresh_token(), Some("refresh"));
        assert_eq!(config.venue.endpoint().to_string(), "live.ctraderapi.com:5036");
        assert_eq!(config.market_data.watchlist, vec!["EURUSD", "GBPUSD"]);
        assert_eq!(config.market_data.mode, AppMode::Light);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn missing_required_variable() {
        let err = SessionConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "CTRADER_ACCESS_TOKEN"));
    }

    #[test]
    fn empty_required_variable() {
        let mut vars = REQUIRED.to_vec();
        vars[0] = ("CT_CLIENT_ID", "  ");
        let err = SessionConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(k) if k == "CT_CLIENT_ID"));
    }

    #[test]
    fn invalid_account_id() {
        let mut vars = REQUIRED.to_vec();
        vars[2] = ("DEMO_ACCOUNT_ID", "abc");
        let err = SessionConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn app_mode_parsing() {
        assert_eq!(AppMode::from_str_case_insensitive("light"), AppMode::Light);
        assert_eq!(AppMode::from_str_case_insensitive("full"), AppMode::Full);
        assert_eq!(AppMode::from_str_case_insensitive("other"), AppMode::Full);
        assert!(!AppMode::Light.subscribes());
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let config = SessionConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("\"secret\""));
        assert!(!debug.contains("\"access\""));
        assert!(debug.contains("[REDACTED]"));
    }
}
