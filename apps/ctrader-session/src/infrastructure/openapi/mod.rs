//! cTrader Open API Adapters
//!
//! Protocol pieces shared by every transport:
//!
//! - **messages**: `prost` definitions of the envelope and payloads
//! - **codec**: typed requests and responses to and from envelopes
//! - **heartbeat**: keep-alive interval and inbound silence tracking
//! - **reconnect**: backoff policy used by the session supervisor

pub mod codec;
pub mod heartbeat;
pub mod reconnect;

// Protobuf definitions mirror the published .proto files field for field.
#[allow(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
pub mod messages;

pub use codec::{CodecError, Inbound};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
