//! In-Memory Transport
//!
//! Loopback transport for tests and offline simulation. Each successful
//! `connect` hands a [`MemoryPeer`] to the paired [`MemoryVenue`], which
//! plays the venue side of that connection.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use prost::Message;
use tokio::sync::mpsc;

use crate::application::ports::{
    Connection, Endpoint, Envelope, InboundFrame, Transport, TransportError,
};
use crate::infrastructure::openapi::codec;
use crate::infrastructure::openapi::messages::payload_type;

/// Create a connected transport/venue pair.
#[must_use]
pub fn memory_transport() -> (MemoryTransport, MemoryVenue) {
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            peers: peers_tx,
            failures: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        },
        MemoryVenue { peers: peers_rx },
    )
}

/// Client side of the loopback.
#[derive(Debug)]
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    failures: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryTransport {
    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Refused(endpoint.to_string()));
        }

        let (to_venue_tx, to_venue_rx) = mpsc::unbounded_channel();
        let (to_session_tx, to_session_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            from_session: to_venue_rx,
            to_session: to_session_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Refused(format!("{endpoint}: venue stopped")))?;

        Ok(Connection {
            outbound: to_venue_tx,
            inbound: to_session_rx,
        })
    }
}

/// Venue side of the loopback; yields one peer per accepted connection.
#[derive(Debug)]
pub struct MemoryVenue {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryVenue {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

/// Venue end of one connection.
#[derive(Debug)]
pub struct MemoryPeer {
    from_session: mpsc::UnboundedReceiver<Envelope>,
    to_session: mpsc::UnboundedSender<InboundFrame>,
}

impl MemoryPeer {
    /// Next envelope written by the session, including heartbeats.
    pub async fn recv_raw(&mut self) -> Option<Envelope> {
        self.from_session.recv().await
    }

    /// Next envelope written by the session, skipping heartbeats.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.from_session.recv().await?;
            if envelope.payload_type != payload_type::HEARTBEAT_EVENT {
                return Some(envelope);
            }
        }
    }

    /// Deliver an envelope to the session.
    pub fn send(&self, envelope: Envelope) {
        let _ = self.to_session.send(InboundFrame::Message(envelope));
    }

    /// Push an unsolicited message.
    pub fn push<M: Message>(&self, payload_type: u32, message: &M) {
        self.send(codec::envelope(payload_type, message));
    }

    /// Answer `request` with a message carrying its correlation id.
    pub fn reply<M: Message>(&self, request: &Envelope, payload_type: u32, message: &M) {
        let mut envelope = codec::envelope(payload_type, message);
        envelope.client_msg_id.clone_from(&request.client_msg_id);
        self.send(envelope);
    }

    /// Close the connection with a reason.
    pub fn close(&self, reason: &str) {
        let _ = self.to_session.send(InboundFrame::Closed(reason.to_string()));
    }

    /// Whether the session has dropped its end.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.to_session.is_closed()
    }
}
