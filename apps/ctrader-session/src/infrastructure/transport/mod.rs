//! Venue Transports
//!
//! Implementations of the [`Transport`](crate::application::ports::Transport) port.

pub mod memory;
pub mod websocket;

pub use memory::{MemoryPeer, MemoryTransport, MemoryVenue, memory_transport};
pub use websocket::{DEFAULT_CONNECT_TIMEOUT, WebSocketTransport};
