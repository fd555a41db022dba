#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::items_after_statements
    )
)]

//! cTrader Session - Venue Session Core
//!
//! Keeps one long-lived cTrader Open API session (protobuf over a TLS
//! WebSocket) and exposes it to in-process consumers as an async
//! request/response and event subscription service.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types
//!   - `session`: Connection state machine, credentials, tokens
//!   - `symbols`: Symbol cache (name ↔ id)
//!   - `market`: Ticks, quotes, live price book, trendbars
//!
//! - **Application**: Session core, ports and services
//!   - `session`: Event loop, request correlator, event dispatcher, token refresh
//!   - `ports`: Transport and token issuer interfaces
//!   - `services`: Supervisor, market data bootstrap, subscription scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `openapi`: Protobuf messages, codec, heartbeat, reconnect policy
//!   - `transport`: WebSocket and in-memory transports
//!   - `token`: HTTP token issuer
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                  ┌──────────────┐   commands   ┌──────────────┐
//!  venue ◄── WS ──►│ session loop │◄────────────│ SessionHandle│◄── consumers
//!                  │              │── events ──►│  handlers    │
//!                  └──────┬───────┘              └──────────────┘
//!                         │ refresh
//!                         ▼
//!                  token endpoint (HTTP)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session, symbol and market data types.
pub mod domain;

/// Application layer - Session core, ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{Bar, LivePrice, PriceBook, Quote, SpotTick, SymbolId, TrendbarPeriod};
pub use domain::session::{AppCredentials, ConnectionState, Session, TokenPair};
pub use domain::symbols::{SymbolCache, SymbolInfo, SymbolListing};

// Session core
pub use application::session::{
    EventKey, HandlerId, SessionError, SessionEvent, SessionHandle, SessionSettings,
    TickSubscription, VenueRequest, VenueResponse, spawn_session,
};

// Services
pub use application::services::{
    MarketDataBootstrap, SchedulerReport, SessionSupervisor, SubscriptionScheduler,
};

// Infrastructure config
pub use infrastructure::config::{AppMode, ConfigError, SessionConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
