//! Application Ports (Driven)
//!
//! Interfaces the session core uses to reach external systems.
//!
//! - `Transport`: reliable connection to the venue carrying whole envelopes
//! - `TokenIssuer`: OAuth endpoint that reissues access tokens

mod token_issuer_port;
mod transport_port;

#[cfg(test)]
pub use token_issuer_port::MockTokenIssuer;
pub use token_issuer_port::{IssuedToken, RefreshError, RefreshRequest, TokenIssuer};
pub use transport_port::{Connection, Endpoint, Envelope, InboundFrame, Transport, TransportError};
