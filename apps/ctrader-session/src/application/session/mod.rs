//! Venue Session
//!
//! One long-lived, authenticated venue session driven by a single task.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ─start─► Connecting ─► AppAuthenticating ─► AppAuthenticated
//!                                                                │
//!              Ready ◄─ AccountAuthenticating ◄──────────────────┘
//!                │                ▲
//!                └─► RefreshingToken ┘
//! ```
//!
//! Any transport loss returns the session to `Disconnected`, fails all
//! pending requests and drops every tick handler. Reconnecting is up to
//! the caller (see [`crate::application::services::SessionSupervisor`]).

mod correlator;
mod error;
mod event_loop;
mod events;
mod handle;
mod refresh;
mod request;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub use correlator::{CorrelationId, Correlator, Pending};
pub use error::SessionError;
pub use events::{Dispatcher, EventHandler, EventKey, HandlerId, SessionEvent};
pub use handle::{QuoteHandler, SessionHandle, TickSubscription};
pub use refresh::{RefreshGuard, RefreshOutcome, spawn_refresh};
pub use request::{RequestKind, VenueError, VenueRequest, VenueResponse};

use crate::application::ports::{Endpoint, TokenIssuer, Transport};
use crate::domain::session::{ConnectionState, Session};
use crate::domain::symbols::SymbolCache;
use crate::infrastructure::openapi::heartbeat::HeartbeatConfig;
use event_loop::SessionCore;

/// Connection parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Venue endpoint.
    pub endpoint: Endpoint,
    /// Default deadline for requests and auth steps.
    pub request_timeout: Duration,
    /// Keep-alive parameters.
    pub heartbeat: HeartbeatConfig,
}

impl SessionSettings {
    /// Settings with the default 10 s request timeout and heartbeat.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            request_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Spawn the session loop and return a handle to it.
///
/// The session starts `Disconnected`; call [`SessionHandle::start`] to
/// connect. The loop ends on [`SessionHandle::shutdown`] or once every
/// handle is dropped.
#[must_use]
pub fn spawn_session(
    settings: SessionSettings,
    session: Session,
    transport: Arc<dyn Transport>,
    issuer: Arc<dyn TokenIssuer>,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (symbols_tx, symbols_rx) = watch::channel(Arc::new(SymbolCache::empty()));

    let handle = SessionHandle::new(commands_tx, state_rx, symbols_rx, settings.request_timeout);
    let event_loop = SessionCore::new(
        settings,
        session,
        transport,
        issuer,
        commands_rx,
        state_tx,
        symbols_tx,
    );
    let task = tokio::spawn(event_loop.run());
    (handle, task)
}
