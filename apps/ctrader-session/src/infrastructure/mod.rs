//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the ambient
//! service plumbing (configuration, health, metrics, telemetry).

/// cTrader Open API messages, codec, heartbeat and reconnect policy.
pub mod openapi;

/// WebSocket and in-memory transports.
pub mod transport;

/// HTTP token issuer.
pub mod token;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
