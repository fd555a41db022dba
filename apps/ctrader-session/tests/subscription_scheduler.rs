//! Subscription Scheduler Integration Tests
//!
//! Staggered spot subscriptions, price book updates and the market data
//! bootstrap that drives them on every `ready`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{
    ACCOUNT_ID, Harness, authorize, authorize_account, decode, expect_request, not_authorized,
    serve_symbols, settle, venue_error,
};
use ctrader_session::application::services::{
    MarketDataBootstrap, SchedulerReport, SubscriptionScheduler,
};
use ctrader_session::application::session::SessionError;
use ctrader_session::domain::market::PriceBook;
use ctrader_session::domain::session::ConnectionState;
use ctrader_session::infrastructure::config::AppMode;
use ctrader_session::infrastructure::openapi::messages::{
    ProtoOaSpotEvent, ProtoOaSubscribeSpotsReq, ProtoOaSubscribeSpotsRes, payload_type,
};
use ctrader_session::infrastructure::transport::MemoryPeer;

const INTERVAL: Duration = Duration::from_millis(200);

const SYMBOLS: &[(i64, &str)] = &[(1, "EUR/USD"), (2, "GBP/USD"), (41, "XAUUSD")];

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn watchlist(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn subscribed() -> ProtoOaSubscribeSpotsRes {
    ProtoOaSubscribeSpotsRes {
        ctid_trader_account_id: ACCOUNT_ID,
        ..Default::default()
    }
}

fn spot(symbol_id: i64, bid: Option<u64>, ask: Option<u64>) -> ProtoOaSpotEvent {
    ProtoOaSpotEvent {
        ctid_trader_account_id: ACCOUNT_ID,
        symbol_id,
        bid,
        ask,
        timestamp: Some(1_700_000_000_000),
        ..Default::default()
    }
}

async fn ready_with_symbols(h: &mut Harness) -> MemoryPeer {
    let mut peer = h.connect_ready().await;
    let handle = h.handle.clone();
    let load = tokio::spawn(async move { handle.load_symbols().await });
    serve_symbols(&mut peer, SYMBOLS).await;
    load.await.unwrap().unwrap();
    peer
}

/// Answer `count` subscription requests, returning (offset, symbol id) pairs.
async fn serve_subscriptions(
    peer: &mut MemoryPeer,
    started: Instant,
    count: usize,
) -> Vec<(Duration, i64)> {
    let mut seen = Vec::with_capacity(count);
    for _ in 0..count {
        let request = expect_request(peer, payload_type::SUBSCRIBE_SPOTS_REQ).await;
        let body: ProtoOaSubscribeSpotsReq = decode(&request);
        seen.push((started.elapsed(), body.symbol_id[0]));
        peer.reply(&request, payload_type::SUBSCRIBE_SPOTS_RES, &subscribed());
    }
    seen
}

fn assert_offset(actual: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(20),
        "request sent at {actual:?}, expected {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn subscriptions_are_spaced_by_interval() {
    let mut h = Harness::default_session();
    let mut peer = ready_with_symbols(&mut h).await;
    let prices = Arc::new(PriceBook::new());
    let scheduler = SubscriptionScheduler::new(h.handle.clone(), Arc::clone(&prices), INTERVAL);

    let started = Instant::now();
    let run = tokio::spawn(async move {
        scheduler
            .run(&watchlist(&["EUR/USD", "GBPUSD", "XAUUSD"]))
            .await
    });
    let seen = serve_subscriptions(&mut peer, started, 3).await;

    assert_eq!(
        seen.iter().map(|(_, id)| *id).collect::<Vec<_>>(),
        vec![1, 2, 41]
    );
    assert_offset(seen[0].0, 0);
    assert_offset(seen[1].0, 200);
    assert_offset(seen[2].0, 400);

    let report = run.await.unwrap();
    assert_eq!(
        report,
        SchedulerReport {
            subscribed: watchlist(&["EURUSD", "GBPUSD", "XAUUSD"]),
            already_subscribed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_and_duplicate_names_are_skipped() {
    let mut h = Harness::default_session();
    let mut peer = ready_with_symbols(&mut h).await;
    let scheduler =
        SubscriptionScheduler::new(h.handle.clone(), Arc::new(PriceBook::new()), INTERVAL);

    let started = Instant::now();
    let run = tokio::spawn(async move {
        scheduler
            .run(&watchlist(&["EURUSD", "USDJPY", "XAUUSD", "EUR/USD"]))
            .await
    });
    let seen = serve_subscriptions(&mut peer, started, 2).await;

    assert_eq!(seen[0].1, 1);
    assert_offset(seen[0].0, 0);
    // The unknown name keeps its slot.
    assert_eq!(seen[1].1, 41);
    assert_offset(seen[1].0, 400);

    let report = run.await.unwrap();
    assert_eq!(report.subscribed, watchlist(&["EURUSD", "XAUUSD"]));
    assert_eq!(report.skipped, watchlist(&["USDJPY"]));
    assert!(report.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failures_are_reported_not_retried() {
    let mut h = Harness::default_session();
    let mut peer = ready_with_symbols(&mut h).await;
    let scheduler =
        SubscriptionScheduler::new(h.handle.clone(), Arc::new(PriceBook::new()), INTERVAL)
            .with_request_timeout(Duration::from_secs(1));

    let run = tokio::spawn(async move { scheduler.run(&watchlist(&["EURUSD", "GBPUSD"])).await });

    let first = expect_request(&mut peer, payload_type::SUBSCRIBE_SPOTS_REQ).await;
    peer.reply(
        &first,
        payload_type::OA_ERROR_RES,
        &venue_error("ALREADY_SUBSCRIBED", "Already subscribed"),
    );
    // The second request is never answered.
    expect_request(&mut peer, payload_type::SUBSCRIBE_SPOTS_REQ).await;

    let report = run.await.unwrap();
    assert!(report.subscribed.is_empty());
    assert_eq!(
        report.failed,
        vec![
            (
                "EURUSD".to_string(),
                SessionError::Protocol {
                    code: "ALREADY_SUBSCRIBED".into(),
                    description: "Already subscribed".into(),
                }
            ),
            (
                "GBPUSD".to_string(),
                SessionError::Timeout(Duration::from_secs(1))
            ),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn ticks_feed_the_price_book() {
    let mut h = Harness::default_session();
    let mut peer = ready_with_symbols(&mut h).await;
    let prices = Arc::new(PriceBook::new());
    let scheduler = SubscriptionScheduler::new(h.handle.clone(), Arc::clone(&prices), INTERVAL);

    let run = tokio::spawn(async move { scheduler.run(&watchlist(&["EURUSD"])).await });
    serve_subscriptions(&mut peer, Instant::now(), 1).await;
    run.await.unwrap();

    peer.push(payload_type::SPOT_EVENT, &spot(1, Some(108_000), None));
    peer.push(payload_type::SPOT_EVENT, &spot(1, None, Some(108_020)));
    // Not subscribed; must not appear.
    peer.push(payload_type::SPOT_EVENT, &spot(2, Some(126_000), Some(126_010)));
    settle().await;

    let eurusd = prices.get("EURUSD").unwrap();
    assert_eq!(eurusd.bid, Some(dec("1.08")));
    assert_eq!(eurusd.ask, Some(dec("1.0802")));
    assert_eq!(eurusd.mid, Some(dec("1.0801")));
    assert!(prices.get("GBPUSD").is_none());
    assert_eq!(prices.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn light_mode_loads_symbols_only() {
    let mut h = Harness::default_session();
    let mut peer = h.connect_ready().await;
    let scheduler =
        SubscriptionScheduler::new(h.handle.clone(), Arc::new(PriceBook::new()), INTERVAL);
    let bootstrap = MarketDataBootstrap::new(
        h.handle.clone(),
        scheduler,
        watchlist(&["EURUSD"]),
        AppMode::Light,
    );

    let run = tokio::spawn(async move { bootstrap.on_ready().await });
    serve_symbols(&mut peer, SYMBOLS).await;

    assert_eq!(run.await.unwrap(), Ok(None));
    assert_eq!(h.handle.symbols().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_reruns_on_every_ready() {
    let mut h = Harness::default_session();
    let prices = Arc::new(PriceBook::new());
    let scheduler = SubscriptionScheduler::new(h.handle.clone(), Arc::clone(&prices), INTERVAL);
    let cancel = CancellationToken::new();
    let task = MarketDataBootstrap::new(
        h.handle.clone(),
        scheduler,
        watchlist(&["XAUUSD"]),
        AppMode::Full,
    )
    .spawn(cancel.clone())
    .await
    .unwrap();

    for round in 0..2 {
        if round > 0 {
            h.handle.start().unwrap();
        }
        let mut peer = if round == 0 {
            h.connect_ready().await
        } else {
            let mut peer = h.accept().await;
            authorize(&mut peer).await;
            peer
        };
        serve_symbols(&mut peer, SYMBOLS).await;
        let seen = serve_subscriptions(&mut peer, Instant::now(), 1).await;
        assert_eq!(seen[0].1, 41);

        settle().await;
        peer.push(
            payload_type::SPOT_EVENT,
            &spot(41, Some(2_650_000_000 + round), Some(2_650_050_000)),
        );
        settle().await;
        assert!(prices.get("XAUUSD").is_some());

        peer.close("cycle");
        h.handle
            .watch_state()
            .wait_for(|s| !s.is_active())
            .await
            .unwrap();
    }

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rerun_on_same_connection_keeps_live_subscriptions() {
    let mut h = Harness::default_session();
    let mut peer = ready_with_symbols(&mut h).await;
    let prices = Arc::new(PriceBook::new());
    let scheduler = SubscriptionScheduler::new(h.handle.clone(), Arc::clone(&prices), INTERVAL);

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(&watchlist(&["EURUSD", "XAUUSD"])).await })
    };
    serve_subscriptions(&mut peer, Instant::now(), 2).await;
    assert_eq!(first.await.unwrap().subscribed.len(), 2);

    let rerun = tokio::spawn(async move {
        scheduler
            .run(&watchlist(&["EURUSD", "XAUUSD", "GBPUSD"]))
            .await
    });
    // Only GBPUSD goes to the venue on the rerun.
    let seen = serve_subscriptions(&mut peer, Instant::now(), 1).await;
    assert_eq!(seen[0].1, 2);

    let report = rerun.await.unwrap();
    assert_eq!(report.already_subscribed, watchlist(&["EURUSD", "XAUUSD"]));
    assert_eq!(report.subscribed, watchlist(&["GBPUSD"]));
    assert!(report.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_ready_does_not_resubscribe() {
    let mut h = Harness::default_session();
    let prices = Arc::new(PriceBook::new());
    let scheduler = SubscriptionScheduler::new(h.handle.clone(), Arc::clone(&prices), INTERVAL);
    let cancel = CancellationToken::new();
    let task = MarketDataBootstrap::new(
        h.handle.clone(),
        scheduler,
        watchlist(&["XAUUSD"]),
        AppMode::Full,
    )
    .spawn(cancel.clone())
    .await
    .unwrap();

    let mut peer = h.connect_ready().await;
    serve_symbols(&mut peer, SYMBOLS).await;
    serve_subscriptions(&mut peer, Instant::now(), 1).await;
    settle().await;

    // Token refresh on the live connection ends in a second `ready`.
    peer.push(payload_type::OA_ERROR_RES, &not_authorized());
    assert_eq!(authorize_account(&mut peer).await, "access-new");
    h.handle
        .watch_state()
        .wait_for(ConnectionState::is_ready)
        .await
        .unwrap();
    serve_symbols(&mut peer, SYMBOLS).await;
    settle().await;

    // The original handler still feeds the price book.
    peer.push(
        payload_type::SPOT_EVENT,
        &spot(41, Some(2_650_000_000), Some(2_650_050_000)),
    );
    settle().await;
    assert!(prices.get("XAUUSD").is_some());

    // No second subscription was sent before the connection closes.
    cancel.cancel();
    task.await.unwrap();
    h.handle.shutdown();
    while let Some(envelope) = peer.recv().await {
        assert_ne!(envelope.payload_type, payload_type::SUBSCRIBE_SPOTS_REQ);
    }
}
