//! Session Event Loop
//!
//! One task owns the session state machine, the request correlator, the
//! event dispatcher, the symbol cache and the refresh guard. Everything
//! that mutates them runs here, so no locks are needed.
//!
//! # Sources
//!
//! ```text
//! handle commands ─┐
//! connect results ─┤
//! refresh results ─┼──► select! ──► state machine / correlator / dispatcher
//! inbound frames  ─┤
//! deadlines       ─┤
//! heartbeat tick  ─┘
//! ```
//!
//! Every connect attempt bumps the connection generation. Connect and
//! refresh results carry the generation they were started under; results
//! from an older generation are discarded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::correlator::{Correlator, Pending};
use super::events::{Dispatcher, EventHandler, EventKey, HandlerId, SessionEvent};
use super::refresh::{RefreshGuard, RefreshOutcome, spawn_refresh};
use super::request::{RequestKind, VenueError, VenueRequest, VenueResponse};
use super::{QuoteHandler, SessionError, SessionSettings, TickSubscription};
use crate::application::ports::{
    Connection, Envelope, InboundFrame, RefreshRequest, TokenIssuer, Transport, TransportError,
};
use crate::domain::market::Quote;
use crate::domain::session::{ConnectionState, Session};
use crate::domain::symbols::SymbolCache;
use crate::infrastructure::metrics;
use crate::infrastructure::openapi::codec::{self, Inbound};
use crate::infrastructure::openapi::heartbeat::HeartbeatMonitor;

type Reply<T> = oneshot::Sender<T>;

/// Requests from [`super::SessionHandle`]s.
pub(crate) enum Command {
    Start,
    Send {
        request: VenueRequest,
        timeout: Duration,
        reply: Reply<Result<VenueResponse, SessionError>>,
    },
    InstallSymbols {
        cache: Arc<SymbolCache>,
        reply: Reply<()>,
    },
    SubscribeTicks {
        symbol: String,
        handler: QuoteHandler,
        reply: Reply<Result<TickSubscription, SessionError>>,
    },
    On {
        key: EventKey,
        handler: EventHandler,
        reply: Reply<Result<HandlerId, SessionError>>,
    },
    Off {
        key: EventKey,
        id: HandlerId,
        reply: Reply<bool>,
    },
    IsRegistered {
        key: EventKey,
        id: HandlerId,
        reply: Reply<bool>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStep {
    Application,
    Account,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => f.write_str("application"),
            Self::Account => f.write_str("account"),
        }
    }
}

/// What to do when a correlated response, timeout or teardown arrives.
#[derive(Debug)]
enum Completion {
    Auth(AuthStep),
    Caller {
        kind: RequestKind,
        sent_at: Instant,
        reply: Reply<Result<VenueResponse, SessionError>>,
    },
}

#[derive(Debug)]
struct ConnectOutcome {
    generation: u64,
    result: Result<Connection, TransportError>,
}

struct Link {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

async fn next_frame(link: &mut Option<Link>) -> Option<InboundFrame> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

fn describe(inbound: &Inbound) -> String {
    match inbound {
        Inbound::Heartbeat => "heartbeat".to_string(),
        Inbound::ApplicationAuthorized => "application_auth".to_string(),
        Inbound::AccountAuthorized { .. } => "account_auth".to_string(),
        Inbound::Response(response) => response.kind().to_string(),
        Inbound::Error(error) => format!("error {}", error.code),
        Inbound::Spot(_) => "spot_event".to_string(),
        Inbound::ClientDisconnect { .. } => "client_disconnect".to_string(),
        Inbound::Unknown(payload_type) => format!("payload type {payload_type}"),
    }
}

fn protocol_error(error: &VenueError) -> SessionError {
    SessionError::Protocol {
        code: error.code.clone(),
        description: error.description.clone().unwrap_or_default(),
    }
}

/// The session task.
pub(crate) struct SessionCore {
    settings: SessionSettings,
    session: Session,
    transport: Arc<dyn Transport>,
    issuer: Arc<dyn TokenIssuer>,
    commands: mpsc::UnboundedReceiver<Command>,
    connects_tx: mpsc::UnboundedSender<ConnectOutcome>,
    connects_rx: mpsc::UnboundedReceiver<ConnectOutcome>,
    refresh_tx: mpsc::UnboundedSender<RefreshOutcome>,
    refresh_rx: mpsc::UnboundedReceiver<RefreshOutcome>,
    correlator: Correlator<Completion>,
    dispatcher: Dispatcher,
    refresh: RefreshGuard,
    link: Option<Link>,
    generation: u64,
    heartbeat: HeartbeatMonitor,
    symbols: Arc<SymbolCache>,
    state_tx: watch::Sender<ConnectionState>,
    symbols_tx: watch::Sender<Arc<SymbolCache>>,
}

impl SessionCore {
    pub(crate) fn new(
        settings: SessionSettings,
        session: Session,
        transport: Arc<dyn Transport>,
        issuer: Arc<dyn TokenIssuer>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        symbols_tx: watch::Sender<Arc<SymbolCache>>,
    ) -> Self {
        let (connects_tx, connects_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let heartbeat = HeartbeatMonitor::new(&settings.heartbeat);
        let symbols = Arc::clone(&symbols_tx.borrow());
        Self {
            settings,
            session,
            transport,
            issuer,
            commands,
            connects_tx,
            connects_rx,
            refresh_tx,
            refresh_rx,
            correlator: Correlator::new(),
            dispatcher: Dispatcher::new(),
            refresh: RefreshGuard::default(),
            link: None,
            generation: 0,
            heartbeat,
            symbols,
            state_tx,
            symbols_tx,
        }
    }

    /// Run until shut down or every handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut ticker = self.settings.heartbeat.ticker();
        tracing::debug!(endpoint = %self.settings.endpoint, "Session loop started");

        loop {
            let connected = self.link.is_some();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        self.teardown("shutdown", None);
                        break;
                    }
                    Some(command) => self.on_command(command),
                },
                Some(outcome) = self.connects_rx.recv() => self.on_connect_outcome(outcome),
                Some(outcome) = self.refresh_rx.recv() => self.on_refresh_outcome(outcome),
                frame = next_frame(&mut self.link) => self.on_frame(frame),
                expired = self.correlator.next_expired() => self.on_expired(expired),
                _ = ticker.tick(), if connected => self.on_heartbeat_tick(),
            }
        }

        tracing::debug!("Session loop stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Send {
                request,
                timeout,
                reply,
            } => self.send(request, timeout, reply),
            Command::InstallSymbols { cache, reply } => {
                self.install_symbols(cache);
                let _ = reply.send(());
            }
            Command::SubscribeTicks {
                symbol,
                handler,
                reply,
            } => {
                let _ = reply.send(self.subscribe_ticks(&symbol, handler));
            }
            Command::On {
                key,
                handler,
                reply,
            } => {
                let result = match key {
                    EventKey::Tick(id) if !self.symbols.contains_id(id) => {
                        Err(SessionError::UnknownSymbolId(id))
                    }
                    _ => Ok(self.dispatcher.on(key, handler)),
                };
                self.publish_tick_gauge();
                let _ = reply.send(result);
            }
            Command::Off { key, id, reply } => {
                let removed = self.dispatcher.off(key, id);
                self.publish_tick_gauge();
                let _ = reply.send(removed);
            }
            Command::IsRegistered { key, id, reply } => {
                let _ = reply.send(self.dispatcher.is_registered(key, id));
            }
            Command::Shutdown => {}
        }
    }

    fn start(&mut self) {
        let state = self.session.state();
        if state.is_active() {
            tracing::debug!(state = %state, "Start ignored, session already active");
            return;
        }

        self.generation += 1;
        self.set_state(ConnectionState::Connecting);

        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let endpoint = self.settings.endpoint.clone();
        let outcomes = self.connects_tx.clone();
        tracing::info!(endpoint = %endpoint, generation, "Connecting to venue");
        tokio::spawn(async move {
            let result = transport.connect(&endpoint).await;
            let _ = outcomes.send(ConnectOutcome { generation, result });
        });
    }

    fn send(
        &mut self,
        request: VenueRequest,
        timeout: Duration,
        reply: Reply<Result<VenueResponse, SessionError>>,
    ) {
        let state = self.session.state();
        if !state.is_ready() {
            metrics::record_request_outcome(request.kind(), "not_ready");
            let _ = reply.send(Err(SessionError::NotReady(state)));
            return;
        }

        let kind = request.kind();
        let envelope = codec::request(&request, self.session.request_account_id());
        let id = self
            .correlator
            .register(timeout, Completion::Caller {
                kind,
                sent_at: Instant::now(),
                reply,
            });
        tracing::debug!(kind = %kind, id, timeout = ?timeout, "Sending request");
        metrics::record_request_sent(kind);
        self.write(envelope.with_client_msg_id(id.to_string()));
    }

    fn install_symbols(&mut self, cache: Arc<SymbolCache>) {
        let pruned = self.dispatcher.retain_ticks(|id| cache.contains_id(id));
        if pruned > 0 {
            tracing::info!(pruned, "Dropped tick handlers for instruments no longer listed");
        }
        tracing::info!(symbols = cache.len(), "Symbol cache installed");
        metrics::set_symbols_loaded(cache.len());
        self.symbols = Arc::clone(&cache);
        self.symbols_tx.send_replace(cache);
        self.publish_tick_gauge();
    }

    fn subscribe_ticks(
        &mut self,
        symbol: &str,
        handler: QuoteHandler,
    ) -> Result<TickSubscription, SessionError> {
        let info = self
            .symbols
            .get(symbol)
            .ok_or_else(|| SessionError::UnknownSymbol(symbol.to_string()))?;

        let name = info.name.clone();
        let digits = info.digits;
        let symbol_id = info.symbol_id;
        let wrapped: EventHandler = Arc::new(move |event: &SessionEvent| {
            if let SessionEvent::Tick(tick) = event {
                handler(&Quote::from_tick(&name, tick, digits));
            }
        });
        let handler_id = self.dispatcher.on(EventKey::Tick(symbol_id), wrapped);
        self.publish_tick_gauge();
        Ok(TickSubscription {
            symbol_id,
            handler_id,
        })
    }

    // =========================================================================
    // Connection
    // =========================================================================

    fn on_connect_outcome(&mut self, outcome: ConnectOutcome) {
        if outcome.generation != self.generation
            || self.session.state() != ConnectionState::Connecting
        {
            tracing::debug!(
                generation = outcome.generation,
                current = self.generation,
                "Discarding stale connect result"
            );
            return;
        }

        match outcome.result {
            Ok(connection) => {
                tracing::info!(generation = self.generation, "Transport connected");
                self.link = Some(Link {
                    outbound: connection.outbound,
                    inbound: connection.inbound,
                });
                self.heartbeat.reset();
                if self.set_state(ConnectionState::AppAuthenticating) {
                    self.send_auth(AuthStep::Application);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transport connect failed");
                self.teardown(&e.to_string(), Some(SessionError::Transport(e.to_string())));
            }
        }
    }

    fn on_frame(&mut self, frame: Option<InboundFrame>) {
        match frame {
            None => self.teardown(
                "transport closed",
                Some(SessionError::Transport("transport closed".into())),
            ),
            Some(InboundFrame::Closed(reason)) => {
                let cause = SessionError::Transport(reason.clone());
                self.teardown(&reason, Some(cause));
            }
            Some(InboundFrame::Message(envelope)) => {
                self.heartbeat.record_inbound();
                match codec::decode(&envelope) {
                    Ok(inbound) => self.route(envelope.client_msg_id.as_deref(), inbound),
                    Err(e) => {
                        tracing::error!(error = %e, "Malformed venue message");
                        let reason = format!("malformed message: {e}");
                        self.teardown(&reason, Some(SessionError::Transport(reason.clone())));
                    }
                }
            }
        }
    }

    fn route(&mut self, client_msg_id: Option<&str>, inbound: Inbound) {
        match inbound {
            Inbound::Heartbeat => tracing::trace!("Heartbeat received"),
            Inbound::Spot(tick) => {
                metrics::record_tick();
                self.dispatcher.emit(&SessionEvent::Tick(tick));
            }
            Inbound::ClientDisconnect { reason } => {
                let reason = format!(
                    "venue disconnect: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.teardown(&reason, Some(SessionError::Transport(reason.clone())));
            }
            Inbound::Unknown(payload_type) => {
                tracing::debug!(payload_type, "Ignoring unhandled message type");
            }
            correlated => match self.correlator.resolve_str(client_msg_id) {
                Some(pending) => self.complete(pending.payload, correlated),
                None => match correlated {
                    Inbound::Error(error) => self.on_unsolicited_error(&error),
                    other => {
                        tracing::debug!(
                            client_msg_id = ?client_msg_id,
                            message = %describe(&other),
                            "Discarding late or uncorrelated response"
                        );
                        metrics::record_late_response();
                    }
                },
            },
        }
    }

    fn complete(&mut self, completion: Completion, inbound: Inbound) {
        match completion {
            Completion::Auth(AuthStep::Application) => match inbound {
                Inbound::ApplicationAuthorized => self.on_application_authorized(),
                Inbound::Error(error) => self.on_auth_error(AuthStep::Application, &error),
                other => self.on_unexpected_auth_response(AuthStep::Application, &other),
            },
            Completion::Auth(AuthStep::Account) => match inbound {
                Inbound::AccountAuthorized { account_id } => self.on_account_authorized(account_id),
                Inbound::Error(error) => self.on_auth_error(AuthStep::Account, &error),
                other => self.on_unexpected_auth_response(AuthStep::Account, &other),
            },
            Completion::Caller {
                kind,
                sent_at,
                reply,
            } => {
                let mut refresh_needed = false;
                let result = match inbound {
                    Inbound::Response(response) if response.kind() == kind => Ok(response),
                    Inbound::Error(error) => {
                        refresh_needed = error.requires_token_refresh();
                        Err(protocol_error(&error))
                    }
                    other => Err(SessionError::UnexpectedResponse {
                        expected: kind.to_string(),
                        actual: describe(&other),
                    }),
                };
                let outcome = result.as_ref().map_or_else(SessionError::kind, |_| "success");
                if result.is_ok() {
                    metrics::record_request_duration(kind, sent_at.elapsed());
                }
                metrics::record_request_outcome(kind, outcome);
                if reply.send(result).is_err() {
                    tracing::debug!(kind = %kind, "Caller dropped before response arrived");
                }
                if refresh_needed {
                    self.trigger_refresh();
                }
            }
        }
    }

    fn on_expired(&mut self, expired: Pending<Completion>) {
        let timeout = expired.timeout;
        match expired.payload {
            Completion::Auth(step) => {
                tracing::warn!(
                    step = %step,
                    timeout = ?timeout,
                    "Authentication timed out"
                );
                self.teardown(
                    &format!("{step} authentication timed out"),
                    Some(SessionError::Timeout(timeout)),
                );
            }
            Completion::Caller { kind, reply, .. } => {
                tracing::debug!(kind = %kind, id = expired.id, "Request timed out");
                metrics::record_request_outcome(kind, "timeout");
                let _ = reply.send(Err(SessionError::Timeout(timeout)));
            }
        }
    }

    fn on_heartbeat_tick(&mut self) {
        if self.heartbeat.is_expired() {
            tracing::warn!(
                silence_secs = self.heartbeat.silence().as_secs(),
                "No traffic from venue, dropping connection"
            );
            self.teardown(
                "heartbeat timeout",
                Some(SessionError::Transport("heartbeat timeout".into())),
            );
            return;
        }
        self.write(codec::heartbeat());
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    fn send_auth(&mut self, step: AuthStep) {
        let envelope = match step {
            AuthStep::Application => codec::application_auth(self.session.credentials()),
            AuthStep::Account => codec::account_auth(
                self.session.account_id(),
                self.session.tokens().access_token(),
            ),
        };
        let id = self
            .correlator
            .register(self.settings.request_timeout, Completion::Auth(step));
        tracing::debug!(step = %step, id, "Sending auth request");
        self.write(envelope.with_client_msg_id(id.to_string()));
    }

    fn on_application_authorized(&mut self) {
        tracing::info!("Application authorized");
        if self.set_state(ConnectionState::AppAuthenticated) {
            self.begin_account_auth();
        }
    }

    fn begin_account_auth(&mut self) {
        if self.set_state(ConnectionState::AccountAuthenticating) {
            self.send_auth(AuthStep::Account);
        }
    }

    fn on_account_authorized(&mut self, account_id: i64) {
        match self.session.mark_account_authorized(account_id) {
            Ok(()) => {
                self.publish_state();
                tracing::info!(account_id, "Account authorized, session ready");
                self.emit(&SessionEvent::Ready { account_id });
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring account auth response"),
        }
    }

    fn on_auth_error(&mut self, step: AuthStep, error: &VenueError) {
        if step == AuthStep::Account && error.requires_token_refresh() {
            tracing::info!(error = %error, "Account token rejected, refreshing");
            self.trigger_refresh();
            return;
        }
        tracing::warn!(step = %step, error = %error, "Authentication rejected");
        self.emit(&SessionEvent::Error(protocol_error(error)));
    }

    fn on_unexpected_auth_response(&mut self, step: AuthStep, inbound: &Inbound) {
        tracing::warn!(step = %step, message = %describe(inbound), "Unexpected auth response");
        self.emit(&SessionEvent::Error(SessionError::UnexpectedResponse {
            expected: format!("{step}_auth"),
            actual: describe(inbound),
        }));
    }

    fn on_unsolicited_error(&mut self, error: &VenueError) {
        if error.requires_token_refresh() {
            tracing::info!(error = %error, "Venue reports account not authorized, refreshing");
            self.trigger_refresh();
            return;
        }
        tracing::warn!(error = %error, "Venue error");
        self.emit(&SessionEvent::Error(protocol_error(error)));
    }

    // =========================================================================
    // Token refresh
    // =========================================================================

    fn trigger_refresh(&mut self) {
        if self.refresh.is_in_flight() {
            tracing::debug!("Token refresh already in progress");
            metrics::record_token_refresh("coalesced");
            // The running refresh may predate this connection; its outcome
            // resumes account auth for whichever connection is waiting.
            self.enter_refreshing();
            return;
        }
        let Some(refresh_token) = self.session.tokens().refresh_token().map(str::to_string) else {
            tracing::warn!("Token refresh needed but no refresh token is configured");
            metrics::record_token_refresh("unavailable");
            self.emit(&SessionEvent::Error(SessionError::Refresh(
                crate::application::ports::RefreshError::NoRefreshToken.to_string(),
            )));
            return;
        };
        if !self.refresh.try_acquire() {
            return;
        }
        self.enter_refreshing();

        let credentials = self.session.credentials();
        let request = RefreshRequest {
            refresh_token,
            client_id: credentials.client_id().to_string(),
            client_secret: credentials.client_secret().to_string(),
        };
        tracing::info!(generation = self.generation, "Requesting new access token");
        spawn_refresh(
            Arc::clone(&self.issuer),
            request,
            self.generation,
            self.refresh_tx.clone(),
        );
    }

    fn enter_refreshing(&mut self) {
        let state = self.session.state();
        if self.session.is_app_authorized()
            && state.can_transition_to(ConnectionState::RefreshingToken)
        {
            self.set_state(ConnectionState::RefreshingToken);
        }
    }

    fn on_refresh_outcome(&mut self, outcome: RefreshOutcome) {
        self.refresh.release();
        let stale = outcome.generation != self.generation;
        // Only the live connection can be in RefreshingToken, whichever
        // generation started the call.
        let refreshing = self.session.state() == ConnectionState::RefreshingToken;

        match outcome.result {
            Ok(token) => {
                tracing::info!(
                    expires_in = ?token.expires_in,
                    rotated_refresh = token.refresh_token.is_some(),
                    stale,
                    "Access token refreshed"
                );
                metrics::record_token_refresh("success");
                self.session
                    .tokens_mut()
                    .rotate(token.access_token, token.refresh_token);
                if refreshing {
                    self.begin_account_auth();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, stale, "Token refresh failed, session stays non-ready");
                metrics::record_token_refresh("failure");
                if refreshing {
                    self.set_state(ConnectionState::AppAuthenticated);
                }
                self.emit(&SessionEvent::Error(SessionError::Refresh(e.to_string())));
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    fn teardown(&mut self, reason: &str, cause: Option<SessionError>) {
        if self.link.is_none() && self.session.state() == ConnectionState::Disconnected {
            return;
        }

        self.generation += 1;
        self.link = None;

        let failed = self.correlator.fail_all();
        let failed_count = failed.len();
        for pending in failed {
            if let Completion::Caller { kind, reply, .. } = pending.payload {
                metrics::record_request_outcome(kind, "disconnected");
                let _ = reply.send(Err(SessionError::Disconnected(reason.to_string())));
            }
        }
        let dropped = self.dispatcher.clear_ticks();

        self.session = self.session.reset();
        self.publish_state();
        self.publish_tick_gauge();

        tracing::warn!(
            reason,
            failed_requests = failed_count,
            dropped_tick_subscriptions = dropped,
            "Session torn down"
        );

        if let Some(cause) = cause {
            self.emit(&SessionEvent::Error(cause));
        }
        self.emit(&SessionEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn set_state(&mut self, next: ConnectionState) -> bool {
        match self.session.transition(next) {
            Ok(()) => {
                tracing::debug!(state = %next, "Session state changed");
                self.publish_state();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected session state change");
                false
            }
        }
    }

    fn publish_state(&self) {
        let state = self.session.state();
        metrics::set_session_state(state);
        self.state_tx.send_replace(state);
    }

    fn publish_tick_gauge(&self) {
        metrics::set_tick_subscriptions(self.dispatcher.tick_subscriptions());
    }

    fn emit(&self, event: &SessionEvent) {
        self.dispatcher.emit(event);
    }

    fn write(&self, envelope: Envelope) {
        let Some(link) = &self.link else {
            tracing::debug!(
                payload_type = envelope.payload_type,
                "No connection, dropping outbound message"
            );
            return;
        };
        if link.outbound.send(envelope).is_err() {
            tracing::warn!("Outbound channel closed, awaiting transport close");
        }
    }
}
