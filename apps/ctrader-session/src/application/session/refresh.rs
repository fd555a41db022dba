//! Token Refresh Flow
//!
//! At most one reissuance runs per session. The HTTP call runs on its own
//! task and its outcome re-enters the session loop as an internal event,
//! so the loop keeps servicing ticks, heartbeats and deadlines meanwhile.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::ports::{IssuedToken, RefreshError, RefreshRequest, TokenIssuer};

/// Outcome of one reissuance, tagged with the connection it was started on.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Connection generation at trigger time.
    pub generation: u64,
    /// Issuer result.
    pub result: Result<IssuedToken, RefreshError>,
}

/// Single in-flight flag.
#[derive(Debug, Default)]
pub struct RefreshGuard {
    in_flight: bool,
}

impl RefreshGuard {
    /// Try to take the guard. Returns `false` if a refresh is already running.
    pub const fn try_acquire(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Clear the guard.
    pub const fn release(&mut self) {
        self.in_flight = false;
    }

    /// Whether a refresh is running.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Run the issuer call off the session loop and post the outcome back.
pub fn spawn_refresh(
    issuer: Arc<dyn TokenIssuer>,
    request: RefreshRequest,
    generation: u64,
    outcomes: mpsc::UnboundedSender<RefreshOutcome>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = issuer.refresh(request).await;
        if outcomes.send(RefreshOutcome { generation, result }).is_err() {
            tracing::debug!("Session loop gone before token refresh completed");
        }
    })
}
