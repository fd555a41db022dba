//! Session Handle
//!
//! Cloneable front for the session loop. Every method forwards a command
//! over a channel; state and the symbol cache are read from watch channels
//! the loop publishes to.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use super::event_loop::Command;
use super::events::{EventKey, HandlerId, SessionEvent};
use super::request::{VenueRequest, VenueResponse};
use super::SessionError;
use crate::domain::market::{Bar, Quote, SymbolId, TrendbarPeriod};
use crate::domain::session::ConnectionState;
use crate::domain::symbols::{SymbolCache, SymbolListing};

/// Tick callback receiving decoded quotes.
pub type QuoteHandler = Arc<dyn Fn(&Quote) + Send + Sync>;

/// Result of [`SessionHandle::subscribe_ticks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSubscription {
    /// Venue instrument id the handler is keyed under.
    pub symbol_id: SymbolId,
    /// Registration token for [`SessionHandle::off`].
    pub handler_id: HandlerId,
}

impl TickSubscription {
    /// Event key of this subscription.
    #[must_use]
    pub const fn key(&self) -> EventKey {
        EventKey::Tick(self.symbol_id)
    }
}

/// Handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    symbols: watch::Receiver<Arc<SymbolCache>>,
    request_timeout: Duration,
}

impl SessionHandle {
    pub(crate) const fn new(
        commands: mpsc::UnboundedSender<Command>,
        state: watch::Receiver<ConnectionState>,
        symbols: watch::Receiver<Arc<SymbolCache>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            commands,
            state,
            symbols,
            request_timeout,
        }
    }

    fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command(build(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a connection and authenticate.
    ///
    /// No-op while a connection is already active. Readiness is reported
    /// through the `ready` event and [`Self::wait_until_ready`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session loop has stopped.
    pub fn start(&self) -> Result<(), SessionError> {
        self.command(Command::Start)
    }

    /// Tear down the connection and stop the session loop.
    pub fn shutdown(&self) {
        if self.command(Command::Shutdown).is_err() {
            tracing::debug!("Session loop already stopped");
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether requests may be issued.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Watch channel of connection states.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session loop stops first.
    pub async fn wait_until_ready(&self) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        state
            .wait_for(ConnectionState::is_ready)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Send a request and wait for its correlated response.
    ///
    /// `timeout` falls back to the configured request timeout.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotReady`] unless the session is `Ready`
    /// - [`SessionError::Timeout`] if no response arrives in time
    /// - [`SessionError::Disconnected`] if the connection drops first
    /// - [`SessionError::Protocol`] if the venue answers with an error
    pub async fn send(
        &self,
        request: VenueRequest,
        timeout: Option<Duration>,
    ) -> Result<VenueResponse, SessionError> {
        let timeout = timeout.unwrap_or(self.request_timeout);
        self.call(|reply| Command::Send {
            request,
            timeout,
            reply,
        })
        .await?
    }

    /// Fetch the full instrument listing.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn get_all_symbols(&self) -> Result<Vec<SymbolListing>, SessionError> {
        let request = VenueRequest::SymbolsList {
            include_archived: false,
        };
        match self.send(request, None).await? {
            VenueResponse::SymbolsList(listings) => Ok(listings),
            other => Err(SessionError::UnexpectedResponse {
                expected: "symbols_list".into(),
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Fetch the listing and install it as the session's symbol cache.
    ///
    /// The new cache replaces the previous one wholesale. Tick handlers for
    /// instruments missing from the new listing are dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn load_symbols(&self) -> Result<Arc<SymbolCache>, SessionError> {
        let listings = self.get_all_symbols().await?;
        let cache = Arc::new(SymbolCache::from_listings(&listings));
        let installed = Arc::clone(&cache);
        self.call(|reply| Command::InstallSymbols {
            cache: installed,
            reply,
        })
        .await?;
        Ok(cache)
    }

    /// Current symbol cache (empty until [`Self::load_symbols`] succeeds).
    #[must_use]
    pub fn symbols(&self) -> Arc<SymbolCache> {
        Arc::clone(&self.symbols.borrow())
    }

    /// Fetch the most recent `count` bars of `period` for an instrument.
    ///
    /// Bars come back sorted oldest first with decimal prices.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownSymbol`] if the name is not in the cache
    /// - otherwise same as [`Self::send`]
    pub async fn get_trendbars(
        &self,
        symbol: &str,
        period: TrendbarPeriod,
        count: u32,
    ) -> Result<Vec<Bar>, SessionError> {
        let symbols = self.symbols();
        let info = symbols
            .get(symbol)
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.to_string()))?;

        let to_ms = Utc::now().timestamp_millis();
        let span_ms = period
            .seconds()
            .saturating_mul(1000)
            .saturating_mul(i64::from(count));
        let request = VenueRequest::Trendbars {
            symbol_id: info.symbol_id,
            period,
            from_ms: to_ms.saturating_sub(span_ms),
            to_ms,
            count: Some(count),
        };

        match self.send(request, None).await? {
            VenueResponse::Trendbars { bars, .. } => Ok(Bar::from_raw_sorted(&bars, info.digits)),
            other => Err(SessionError::UnexpectedResponse {
                expected: "trendbars".into(),
                actual: other.kind().to_string(),
            }),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Register a quote handler for an instrument by name.
    ///
    /// Only registers locally; the venue-side spot subscription is sent by
    /// the subscription scheduler. Tick handlers are dropped on teardown.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSymbol`] if the name is not in the cache.
    pub async fn subscribe_ticks<F>(
        &self,
        symbol: &str,
        handler: F,
    ) -> Result<TickSubscription, SessionError>
    where
        F: Fn(&Quote) + Send + Sync + 'static,
    {
        let symbol = symbol.to_string();
        let handler: QuoteHandler = Arc::new(handler);
        self.call(|reply| Command::SubscribeTicks {
            symbol,
            handler,
            reply,
        })
        .await?
    }

    /// Register a handler for an event key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSymbolId`] for a tick key whose
    /// instrument is not in the cache.
    pub async fn on<F>(&self, key: EventKey, handler: F) -> Result<HandlerId, SessionError>
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let handler: super::EventHandler = Arc::new(handler);
        self.call(|reply| Command::On {
            key,
            handler,
            reply,
        })
        .await?
    }

    /// Deregister a handler. Returns whether it was registered.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session loop has stopped.
    pub async fn off(&self, key: EventKey, id: HandlerId) -> Result<bool, SessionError> {
        self.call(|reply| Command::Off { key, id, reply }).await
    }

    /// Whether a handler is still registered. Tick handlers stop being
    /// registered when the connection is torn down.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session loop has stopped.
    pub async fn is_registered(&self, key: EventKey, id: HandlerId) -> Result<bool, SessionError> {
        self.call(|reply| Command::IsRegistered { key, id, reply }).await
    }
}
