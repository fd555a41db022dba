//! Shared harness for session integration tests.
//!
//! Drives a real session loop over the in-memory transport; the test plays
//! the venue through [`MemoryPeer`].

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prost::Message;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use ctrader_session::application::ports::{
    Endpoint, Envelope, IssuedToken, RefreshError, RefreshRequest, TokenIssuer,
    Transport,
};
use ctrader_session::application::session::{
    EventKey, SessionEvent, SessionHandle, SessionSettings, spawn_session,
};
use ctrader_session::domain::session::{AppCredentials, Session, TokenPair};
use ctrader_session::infrastructure::openapi::HeartbeatConfig;
use ctrader_session::infrastructure::openapi::messages::{
    ProtoOaAccountAuthReq, ProtoOaAccountAuthRes, ProtoOaApplicationAuthRes, ProtoOaErrorRes,
    ProtoOaLightSymbol, ProtoOaSymbolsListRes, payload_type,
};
use ctrader_session::infrastructure::transport::{
    MemoryPeer, MemoryTransport, MemoryVenue, memory_transport,
};

pub const ACCOUNT_ID: i64 = 4_411_001;
pub const ACCESS_TOKEN: &str = "access-initial";
pub const REFRESH_TOKEN: &str = "refresh-initial";

/// Upper bound for anything a test waits on.
const WAIT: Duration = Duration::from_secs(600);

// =============================================================================
// Builders
// =============================================================================

pub fn settings() -> SessionSettings {
    SessionSettings {
        endpoint: Endpoint::new("memory", 5035),
        request_timeout: Duration::from_secs(5),
        // Long enough that paused-clock jumps never trip the watchdog.
        heartbeat: HeartbeatConfig::new(Duration::from_secs(60), Duration::from_secs(600)),
    }
}

pub fn session(refresh_token: Option<&str>) -> Session {
    Session::new(
        AppCredentials::new("client-id", "client-secret"),
        ACCOUNT_ID,
        TokenPair::new(ACCESS_TOKEN, refresh_token.map(str::to_string)),
    )
}

// =============================================================================
// Token issuer
// =============================================================================

/// Token issuer returning a fixed outcome, optionally held until released.
pub struct TestIssuer {
    outcome: Result<IssuedToken, RefreshError>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RefreshRequest>>,
}

impl TestIssuer {
    pub fn issuing(access_token: &str) -> Self {
        Self::with_outcome(Ok(IssuedToken {
            access_token: access_token.to_string(),
            refresh_token: Some("refresh-rotated".to_string()),
            expires_in: Some(2_628_000),
        }))
    }

    pub fn failing(error: RefreshError) -> Self {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<IssuedToken, RefreshError>) -> Self {
        Self {
            outcome,
            gate: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Hold every refresh until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RefreshRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TokenIssuer for TestIssuer {
    async fn refresh(&self, request: RefreshRequest) -> Result<IssuedToken, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.outcome.clone()
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub handle: SessionHandle,
    pub venue: MemoryVenue,
    pub transport: Arc<MemoryTransport>,
    pub issuer: Arc<TestIssuer>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn spawn(session: Session, issuer: TestIssuer) -> Self {
        Self::spawn_with(settings(), session, issuer)
    }

    pub fn spawn_with(settings: SessionSettings, session: Session, issuer: TestIssuer) -> Self {
        let (transport, venue) = memory_transport();
        let transport = Arc::new(transport);
        let issuer = Arc::new(issuer);
        let transport_port: Arc<dyn Transport> = transport.clone();
        let issuer_port: Arc<dyn TokenIssuer> = issuer.clone();
        let (handle, task) = spawn_session(settings, session, transport_port, issuer_port);
        Self {
            handle,
            venue,
            transport,
            issuer,
            task,
        }
    }

    /// Default session with a refresh token and a succeeding issuer.
    pub fn default_session() -> Self {
        Self::spawn(session(Some(REFRESH_TOKEN)), TestIssuer::issuing("access-new"))
    }

    pub async fn accept(&mut self) -> MemoryPeer {
        tokio::time::timeout(WAIT, self.venue.accept())
            .await
            .expect("no connection attempt")
            .expect("transport dropped")
    }

    /// Start the session and complete both auth steps.
    pub async fn connect_ready(&mut self) -> MemoryPeer {
        self.handle.start().unwrap();
        let mut peer = self.accept().await;
        authorize(&mut peer).await;
        tokio::time::timeout(WAIT, self.handle.wait_until_ready())
            .await
            .expect("session never became ready")
            .unwrap();
        peer
    }
}

// =============================================================================
// Venue side
// =============================================================================

pub async fn next_request(peer: &mut MemoryPeer) -> Envelope {
    tokio::time::timeout(WAIT, peer.recv())
        .await
        .expect("session sent nothing")
        .expect("session closed the connection")
}

pub async fn expect_request(peer: &mut MemoryPeer, expected: u32) -> Envelope {
    let envelope = next_request(peer).await;
    assert_eq!(envelope.payload_type, expected, "unexpected request type");
    assert!(envelope.client_msg_id.is_some(), "request lacks correlation id");
    envelope
}

pub fn decode<M: Message + Default>(envelope: &Envelope) -> M {
    M::decode(envelope.payload.as_slice()).expect("undecodable payload")
}

/// Answer the application auth request.
pub async fn authorize_application(peer: &mut MemoryPeer) {
    let request = expect_request(peer, payload_type::APPLICATION_AUTH_REQ).await;
    peer.reply(
        &request,
        payload_type::APPLICATION_AUTH_RES,
        &ProtoOaApplicationAuthRes::default(),
    );
}

/// Answer an account auth request, returning the token it carried.
pub async fn authorize_account(peer: &mut MemoryPeer) -> String {
    let request = expect_request(peer, payload_type::ACCOUNT_AUTH_REQ).await;
    let body: ProtoOaAccountAuthReq = decode(&request);
    peer.reply(
        &request,
        payload_type::ACCOUNT_AUTH_RES,
        &ProtoOaAccountAuthRes {
            ctid_trader_account_id: body.ctid_trader_account_id,
            ..Default::default()
        },
    );
    body.access_token
}

pub async fn authorize(peer: &mut MemoryPeer) {
    authorize_application(peer).await;
    authorize_account(peer).await;
}

pub fn venue_error(code: &str, description: &str) -> ProtoOaErrorRes {
    ProtoOaErrorRes {
        ctid_trader_account_id: Some(ACCOUNT_ID),
        error_code: code.to_string(),
        description: Some(description.to_string()),
        ..Default::default()
    }
}

pub fn not_authorized() -> ProtoOaErrorRes {
    venue_error("INVALID_REQUEST", "Trading account is not authorized")
}

pub fn symbol_list(symbols: &[(i64, &str)]) -> ProtoOaSymbolsListRes {
    ProtoOaSymbolsListRes {
        ctid_trader_account_id: ACCOUNT_ID,
        symbol: symbols
            .iter()
            .map(|(id, name)| ProtoOaLightSymbol {
                symbol_id: *id,
                symbol_name: Some((*name).to_string()),
                enabled: Some(true),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// Answer the next symbol list request.
pub async fn serve_symbols(peer: &mut MemoryPeer, symbols: &[(i64, &str)]) {
    let request = expect_request(peer, payload_type::SYMBOLS_LIST_REQ).await;
    peer.reply(&request, payload_type::SYMBOLS_LIST_RES, &symbol_list(symbols));
}

// =============================================================================
// Events
// =============================================================================

/// Collects events from one or more keys in arrival order.
pub struct Recorder {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Recorder {
    pub async fn attach(handle: &SessionHandle, keys: &[EventKey]) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for key in keys {
            let tx = tx.clone();
            handle
                .on(*key, move |event: &SessionEvent| {
                    let _ = tx.send(event.clone());
                })
                .await
                .unwrap();
        }
        Self { rx }
    }

    pub async fn next(&mut self) -> SessionEvent {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("no event")
            .expect("recorder closed")
    }

    /// Events already delivered, without waiting.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Let every spawned task run until it blocks.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
