//! Prometheus Metrics Module
//!
//! Exposes session metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Requests**: Requests sent and their outcomes by kind, plus latency
//! - **Session**: Connection state, reconnects, token refreshes
//! - **Market data**: Ticks received, tick subscriptions, symbols loaded
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::session::RequestKind;
use crate::domain::session::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the already-installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Requests
    describe_counter!(
        "ctrader_session_requests_sent_total",
        "Requests written to the venue by kind"
    );
    describe_counter!(
        "ctrader_session_request_outcomes_total",
        "Request completions by kind and outcome"
    );
    describe_counter!(
        "ctrader_session_late_responses_total",
        "Responses discarded because their request had already completed"
    );
    describe_histogram!(
        "ctrader_session_request_duration_seconds",
        "Time from request write to correlated response"
    );

    // Session
    describe_gauge!(
        "ctrader_session_state",
        "Connection state code (0 = disconnected, 6 = ready)"
    );
    describe_counter!(
        "ctrader_session_reconnects_total",
        "Session restarts issued by the supervisor"
    );
    describe_counter!(
        "ctrader_session_token_refreshes_total",
        "Token refresh triggers by result"
    );

    // Market data
    describe_counter!("ctrader_session_ticks_total", "Spot events received");
    describe_gauge!(
        "ctrader_session_tick_subscriptions",
        "Instruments with at least one tick handler"
    );
    describe_gauge!(
        "ctrader_session_symbols_loaded",
        "Instruments in the installed symbol cache"
    );
    describe_counter!(
        "ctrader_session_spot_subscriptions_total",
        "Scheduler subscription attempts by result"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

#[allow(clippy::cast_precision_loss)]
fn as_gauge(count: usize) -> f64 {
    count as f64
}

/// Record a request written to the venue.
pub fn record_request_sent(kind: RequestKind) {
    counter!("ctrader_session_requests_sent_total", "kind" => kind.as_str()).increment(1);
}

/// Record how a request completed.
pub fn record_request_outcome(kind: RequestKind, outcome: &'static str) {
    counter!(
        "ctrader_session_request_outcomes_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the round-trip time of a successful request.
pub fn record_request_duration(kind: RequestKind, duration: Duration) {
    histogram!(
        "ctrader_session_request_duration_seconds",
        "kind" => kind.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record a discarded late response.
pub fn record_late_response() {
    counter!("ctrader_session_late_responses_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_session_state(state: ConnectionState) {
    gauge!("ctrader_session_state").set(f64::from(state.as_code()));
}

/// Record a supervisor restart.
pub fn record_reconnect() {
    counter!("ctrader_session_reconnects_total").increment(1);
}

/// Record a token refresh trigger by result.
pub fn record_token_refresh(result: &'static str) {
    counter!("ctrader_session_token_refreshes_total", "result" => result).increment(1);
}

/// Record a spot event.
pub fn record_tick() {
    counter!("ctrader_session_ticks_total").increment(1);
}

/// Update the tick subscription gauge.
pub fn set_tick_subscriptions(count: usize) {
    gauge!("ctrader_session_tick_subscriptions").set(as_gauge(count));
}

/// Update the symbol cache size gauge.
pub fn set_symbols_loaded(count: usize) {
    gauge!("ctrader_session_symbols_loaded").set(as_gauge(count));
}

/// Record a scheduler subscription attempt by result.
pub fn record_subscription(result: &'static str) {
    counter!("ctrader_session_spot_subscriptions_total", "result" => result).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
