//! WebSocket Transport
//!
//! `wss://{host}:{port}` with one binary frame per serialized
//! `ProtoMessage`. A reader task and a writer task bridge the socket to the
//! connection's channels; dropping the outbound sender closes the socket.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{
    Connection, Endpoint, Envelope, InboundFrame, Transport, TransportError,
};
use crate::infrastructure::openapi::codec;

/// Default time allowed for the TCP, TLS and WebSocket handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport over a TLS WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketTransport {
    /// Create a transport with the given handshake timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// URL for an endpoint.
    #[must_use]
    pub fn url(endpoint: &Endpoint) -> String {
        format!("wss://{}:{}", endpoint.host, endpoint.port)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        let url = Self::url(endpoint);
        tracing::debug!(url = %url, "Opening WebSocket");

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(&url))
                .await
                .map_err(|_| TransportError::ConnectTimeout(endpoint.to_string()))?
                .map_err(|e| TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                })?;

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer_events = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                let frame = codec::encode_frame(&envelope);
                if let Err(e) = write.send(Message::Binary(frame.into())).await {
                    let _ = writer_events.send(InboundFrame::Closed(format!("write failed: {e}")));
                    return;
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!(error = %e, "WebSocket close failed");
            }
        });

        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Binary(bytes))) => match codec::decode_frame(&bytes) {
                        Ok(envelope) => {
                            if inbound_tx.send(InboundFrame::Message(envelope)).is_err() {
                                return;
                            }
                        }
                        Err(e) => break format!("malformed frame: {e}"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(
                            || "closed by venue".to_string(),
                            |f| format!("closed by venue: {}", f.reason),
                        );
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("read failed: {e}"),
                    None => break "stream ended".to_string(),
                }
            };
            tracing::info!(reason = %reason, "WebSocket closed");
            let _ = inbound_tx.send(InboundFrame::Closed(reason));
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
