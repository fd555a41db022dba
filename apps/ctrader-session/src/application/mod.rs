//! Application Layer - Session core, ports and services.
//!
//! The session core drives the venue protocol through the transport and
//! token issuer ports; services build market data behaviour on top of the
//! session handle.

/// Port interfaces for the transport and token issuer.
pub mod ports;

/// Supervisor, bootstrap and subscription scheduler.
pub mod services;

/// Session state machine, correlator, dispatcher and handle.
pub mod session;
