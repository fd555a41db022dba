//! cTrader Session Binary
//!
//! Runs one supervised venue session, loads symbols on every `ready`,
//! subscribes the watchlist and serves health and metrics.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ctrader-session
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `CT_CLIENT_ID`, `CT_CLIENT_SECRET`: Open API application credentials
//! - `DEMO_ACCOUNT_ID`: Trading account id
//! - `CTRADER_ACCESS_TOKEN`: Account access token
//!
//! ## Optional
//! - `CTRADER_REFRESH_TOKEN`: Refresh token for access token reissuance
//! - `CTRADER_TOKEN_URL`: Token endpoint (default: <https://connect.spotware.com/apps/token>)
//! - `CTRADER_HOST` / `CTRADER_PORT`: Venue endpoint (default: demo.ctraderapi.com:5035)
//! - `CTRADER_WATCHLIST`: Comma separated instruments to subscribe
//! - `APP_MODE`: full | light (default: full)
//! - `SESSION_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`, `RUST_LOG`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ctrader_session::application::services::{
    MarketDataBootstrap, SessionSupervisor, SubscriptionScheduler,
};
use ctrader_session::application::session::{
    EventKey, SessionEvent, SessionHandle, SessionSettings, spawn_session,
};
use ctrader_session::domain::market::PriceBook;
use ctrader_session::domain::session::Session;
use ctrader_session::infrastructure::health::{HealthServer, HealthServerState};
use ctrader_session::infrastructure::openapi::{HeartbeatConfig, ReconnectConfig};
use ctrader_session::infrastructure::telemetry;
use ctrader_session::infrastructure::token::HttpTokenIssuer;
use ctrader_session::infrastructure::transport::WebSocketTransport;
use ctrader_session::{SessionConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for token endpoint calls.
const TOKEN_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("telemetry setup failed")?;

    tracing::info!("Starting cTrader session");

    let _metrics_handle = init_metrics().context("metrics setup failed")?;

    let config = SessionConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let settings = SessionSettings {
        endpoint: config.venue.endpoint(),
        request_timeout: config.venue.request_timeout,
        heartbeat: HeartbeatConfig::new(
            config.venue.heartbeat_interval,
            config.venue.heartbeat_timeout,
        ),
    };
    let session = Session::new(
        config.credentials.clone(),
        config.account_id,
        config.tokens.clone(),
    );
    let issuer = HttpTokenIssuer::new(config.token_url.clone(), TOKEN_HTTP_TIMEOUT)?;
    let (handle, session_task) = spawn_session(
        settings,
        session,
        Arc::new(WebSocketTransport::default()),
        Arc::new(issuer),
    );
    log_session_errors(&handle).await?;

    let prices = Arc::new(PriceBook::new());
    let scheduler = SubscriptionScheduler::new(
        handle.clone(),
        Arc::clone(&prices),
        config.market_data.subscribe_interval,
    );
    let bootstrap = MarketDataBootstrap::new(
        handle.clone(),
        scheduler,
        config.market_data.watchlist.clone(),
        config.market_data.mode,
    );
    let bootstrap_task = bootstrap.spawn(shutdown_token.clone()).await?;

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        handle.clone(),
        Arc::clone(&prices),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let supervisor = SessionSupervisor::new(
        handle.clone(),
        ReconnectConfig::from_settings(&config.reconnect),
    );
    let supervisor_task = supervisor.spawn(shutdown_token.clone()).await?;

    await_shutdown(shutdown_token).await;

    handle.shutdown();
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = supervisor_task.await;
        let _ = bootstrap_task.await;
        let _ = session_task.await;
        let _ = health_task.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting anyway"
        );
    }

    tracing::info!("cTrader session stopped");
    Ok(())
}

/// Log `error` events raised outside any request.
async fn log_session_errors(handle: &SessionHandle) -> anyhow::Result<()> {
    handle
        .on(EventKey::Error, |event: &SessionEvent| {
            if let SessionEvent::Error(error) = event {
                tracing::warn!(error = %error, kind = error.kind(), "Session error");
            }
        })
        .await?;
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &SessionConfig) {
    tracing::info!(
        endpoint = %config.venue.endpoint(),
        account_id = config.account_id,
        mode = config.market_data.mode.as_str(),
        watchlist = config.market_data.watchlist.len(),
        health_port = config.server.health_port,
        refresh_token = config.tokens.refresh_token().is_some(),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
