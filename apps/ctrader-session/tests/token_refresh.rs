//! Token Refresh Integration Tests
//!
//! A rejected account token is reissued through the token endpoint and
//! account authentication is retried on the same connection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use tokio::sync::Notify;

use common::{
    ACCOUNT_ID, Harness, REFRESH_TOKEN, Recorder, TestIssuer, authorize_account,
    authorize_application, expect_request, not_authorized, session, settle,
};
use ctrader_session::application::ports::RefreshError;
use ctrader_session::application::session::{EventKey, SessionError, SessionEvent, VenueRequest};
use ctrader_session::domain::session::ConnectionState;
use ctrader_session::infrastructure::openapi::messages::payload_type;

#[tokio::test(start_paused = true)]
async fn rejected_account_token_is_refreshed_and_retried() {
    let mut h = Harness::spawn(session(Some(REFRESH_TOKEN)), TestIssuer::issuing("access-new"));
    let mut ready = Recorder::attach(&h.handle, &[EventKey::Ready]).await;

    h.handle.start().unwrap();
    let mut peer = h.accept().await;
    authorize_application(&mut peer).await;

    let account = expect_request(&mut peer, payload_type::ACCOUNT_AUTH_REQ).await;
    peer.reply(&account, payload_type::OA_ERROR_RES, &not_authorized());

    assert_eq!(authorize_account(&mut peer).await, "access-new");
    h.handle.wait_until_ready().await.unwrap();
    assert_eq!(
        ready.next().await,
        SessionEvent::Ready {
            account_id: ACCOUNT_ID
        }
    );

    assert_eq!(h.issuer.calls(), 1);
    let request = &h.issuer.requests()[0];
    assert_eq!(request.refresh_token, REFRESH_TOKEN);
    assert_eq!(request.client_id, "client-id");
    assert_eq!(request.client_secret, "client-secret");

    // The rotated refresh token is used for the next reissue.
    peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    authorize_account(&mut peer).await;
    h.handle.wait_until_ready().await.unwrap();
    assert_eq!(h.issuer.calls(), 2);
    assert_eq!(h.issuer.requests()[1].refresh_token, "refresh-rotated");
}

#[tokio::test(start_paused = true)]
async fn concurrent_triggers_share_one_refresh() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::spawn(
        session(Some(REFRESH_TOKEN)),
        TestIssuer::issuing("access-new").gated(Arc::clone(&gate)),
    );
    let mut peer = h.connect_ready().await;

    for _ in 0..5 {
        peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    }
    settle().await;

    assert_eq!(h.issuer.calls(), 1);
    assert_eq!(h.handle.state(), ConnectionState::RefreshingToken);
    assert_eq!(
        h.handle
            .send(VenueRequest::SubscribeSpots { symbol_ids: vec![1] }, None)
            .await,
        Err(SessionError::NotReady(ConnectionState::RefreshingToken))
    );

    gate.notify_one();
    assert_eq!(authorize_account(&mut peer).await, "access-new");
    h.handle.wait_until_ready().await.unwrap();
    assert_eq!(h.issuer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn caller_sees_venue_error_and_refresh_starts() {
    let mut h = Harness::default_session();
    let mut peer = h.connect_ready().await;

    let handle = h.handle.clone();
    let pending = tokio::spawn(async move { handle.get_all_symbols().await });
    let request = expect_request(&mut peer, payload_type::SYMBOLS_LIST_REQ).await;
    peer.reply(&request, payload_type::OA_ERROR_RES, &not_authorized());

    assert_eq!(
        pending.await.unwrap(),
        Err(SessionError::Protocol {
            code: "INVALID_REQUEST".into(),
            description: "Trading account is not authorized".into(),
        })
    );
    assert_eq!(authorize_account(&mut peer).await, "access-new");
    h.handle.wait_until_ready().await.unwrap();
    assert_eq!(h.issuer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_refresh_token_reports_error() {
    let mut h = Harness::spawn(session(None), TestIssuer::issuing("unused"));
    let mut errors = Recorder::attach(&h.handle, &[EventKey::Error]).await;

    h.handle.start().unwrap();
    let mut peer = h.accept().await;
    authorize_application(&mut peer).await;
    let account = expect_request(&mut peer, payload_type::ACCOUNT_AUTH_REQ).await;
    peer.reply(&account, payload_type::OA_ERROR_RES, &not_authorized());

    assert_eq!(
        errors.next().await,
        SessionEvent::Error(SessionError::Refresh(
            RefreshError::NoRefreshToken.to_string()
        ))
    );
    assert_eq!(h.issuer.calls(), 0);
    assert!(!h.handle.is_ready());
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_falls_back_and_can_be_retried() {
    let mut h = Harness::spawn(
        session(Some(REFRESH_TOKEN)),
        TestIssuer::failing(RefreshError::Status {
            status: 400,
            body: "invalid_grant".into(),
        }),
    );
    let peer = h.connect_ready().await;
    let mut errors = Recorder::attach(&h.handle, &[EventKey::Error]).await;

    peer.push(payload_type::OA_ERROR_RES, &not_authorized());

    assert_eq!(
        errors.next().await,
        SessionEvent::Error(SessionError::Refresh(
            "token endpoint returned HTTP 400: invalid_grant".into()
        ))
    );
    assert_eq!(h.handle.state(), ConnectionState::AppAuthenticated);

    // The guard was released, so a new trigger reaches the issuer again.
    peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    assert!(matches!(
        errors.next().await,
        SessionEvent::Error(SessionError::Refresh(_))
    ));
    assert_eq!(h.issuer.calls(), 2);
    assert_eq!(h.handle.state(), ConnectionState::AppAuthenticated);
}

#[tokio::test(start_paused = true)]
async fn refresh_result_after_disconnect_does_not_resume_auth() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::spawn(
        session(Some(REFRESH_TOKEN)),
        TestIssuer::issuing("access-new").gated(Arc::clone(&gate)),
    );
    let peer = h.connect_ready().await;

    peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    settle().await;
    assert_eq!(h.issuer.calls(), 1);

    peer.close("lost");
    h.handle
        .watch_state()
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    gate.notify_one();
    settle().await;
    assert_eq!(h.handle.state(), ConnectionState::Disconnected);

    // The reissued token is kept for the next connection.
    h.handle.start().unwrap();
    let mut peer = h.accept().await;
    authorize_application(&mut peer).await;
    assert_eq!(authorize_account(&mut peer).await, "access-new");
    h.handle.wait_until_ready().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn refresh_started_before_reconnect_resumes_new_connection() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::spawn(
        session(Some(REFRESH_TOKEN)),
        TestIssuer::issuing("access-new").gated(Arc::clone(&gate)),
    );
    let peer = h.connect_ready().await;

    peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    settle().await;
    assert_eq!(h.issuer.calls(), 1);

    peer.close("lost");
    h.handle
        .watch_state()
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    // The new connection's account auth is rejected while the first
    // refresh is still outstanding.
    h.handle.start().unwrap();
    let mut peer = h.accept().await;
    authorize_application(&mut peer).await;
    let account = expect_request(&mut peer, payload_type::ACCOUNT_AUTH_REQ).await;
    peer.reply(&account, payload_type::OA_ERROR_RES, &not_authorized());
    settle().await;
    assert_eq!(h.handle.state(), ConnectionState::RefreshingToken);

    gate.notify_one();
    assert_eq!(authorize_account(&mut peer).await, "access-new");
    h.handle.wait_until_ready().await.unwrap();
    assert_eq!(h.issuer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_before_reconnect_releases_new_connection() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::spawn(
        session(Some(REFRESH_TOKEN)),
        TestIssuer::failing(RefreshError::Transport("connection reset".into()))
            .gated(Arc::clone(&gate)),
    );
    let peer = h.connect_ready().await;

    peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    settle().await;
    peer.close("lost");
    h.handle
        .watch_state()
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    h.handle.start().unwrap();
    let mut peer = h.accept().await;
    authorize_application(&mut peer).await;
    let account = expect_request(&mut peer, payload_type::ACCOUNT_AUTH_REQ).await;
    let mut errors = Recorder::attach(&h.handle, &[EventKey::Error]).await;
    peer.reply(&account, payload_type::OA_ERROR_RES, &not_authorized());
    settle().await;
    assert_eq!(h.handle.state(), ConnectionState::RefreshingToken);

    gate.notify_one();
    assert_eq!(
        errors.next().await,
        SessionEvent::Error(SessionError::Refresh(
            "token endpoint unreachable: connection reset".into()
        ))
    );
    assert_eq!(h.handle.state(), ConnectionState::AppAuthenticated);
}
