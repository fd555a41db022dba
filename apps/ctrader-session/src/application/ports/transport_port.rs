//! Transport Port (Driven Port)
//!
//! A reliable, ordered connection to the venue that delivers whole message
//! envelopes in both directions plus one close notification.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Venue host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One framed venue message: type discriminator, raw payload and the
/// optional correlation id echoed by the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Venue payload type number.
    pub payload_type: u32,
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
    /// Correlation id (`clientMsgId`).
    pub client_msg_id: Option<String>,
}

impl Envelope {
    /// Create an envelope without a correlation id.
    #[must_use]
    pub const fn new(payload_type: u32, payload: Vec<u8>) -> Self {
        Self {
            payload_type,
            payload,
            client_msg_id: None,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_client_msg_id(mut self, id: impl Into<String>) -> Self {
        self.client_msg_id = Some(id.into());
        self
    }
}

/// Something received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A fully decoded envelope.
    Message(Envelope),
    /// The connection closed; no further frames follow.
    Closed(String),
}

/// An established connection.
///
/// Dropping `outbound` closes the connection.
#[derive(Debug)]
pub struct Connection {
    /// Envelopes to write, in order.
    pub outbound: mpsc::UnboundedSender<Envelope>,
    /// Frames read from the venue, in order.
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Transport error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connect to {endpoint} failed: {message}")]
    Connect {
        /// Target endpoint.
        endpoint: String,
        /// Error details.
        message: String,
    },

    /// Connection attempt did not finish in time.
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    /// The peer refused the connection.
    #[error("connection refused: {0}")]
    Refused(String),
}

/// Port for connecting to the venue.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        let endpoint = Endpoint::new("demo.ctraderapi.com", 5035);
        assert_eq!(endpoint.to_string(), "demo.ctraderapi.com:5035");
    }

    #[test]
    fn envelope_with_id() {
        let envelope = Envelope::new(51, Vec::new()).with_client_msg_id("7");
        assert_eq!(envelope.client_msg_id.as_deref(), Some("7"));
        assert_eq!(envelope.payload_type, 51);
    }
}
