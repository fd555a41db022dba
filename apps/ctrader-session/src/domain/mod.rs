//! Domain Layer - Core session and market data types.
//!
//! This layer contains the pure types of the venue session with no I/O:
//! the session state machine, the symbol snapshot and market data values.

/// Market data values: ticks, quotes, bars, the live price book.
pub mod market;

/// Session lifecycle state, credentials and tokens.
pub mod session;

/// Immutable instrument name/id snapshot.
pub mod symbols;
