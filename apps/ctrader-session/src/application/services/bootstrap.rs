//! Market Data Bootstrap
//!
//! Every time the session becomes ready: reload the symbol cache, then
//! (in full mode) subscribe the watchlist. Tick handlers do not survive a
//! reconnect, so the whole sequence reruns on each `ready`; a `ready` that
//! follows a token refresh on the same connection finds the handlers still
//! registered and sends no new subscriptions.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::scheduler::{SchedulerReport, SubscriptionScheduler};
use crate::application::session::{EventKey, SessionError, SessionEvent, SessionHandle};
use crate::infrastructure::config::AppMode;

/// Symbol loading and watchlist subscription on `ready`.
#[derive(Debug, Clone)]
pub struct MarketDataBootstrap {
    session: SessionHandle,
    scheduler: SubscriptionScheduler,
    watchlist: Vec<String>,
    mode: AppMode,
}

impl MarketDataBootstrap {
    /// Create a bootstrap for `watchlist`.
    #[must_use]
    pub const fn new(
        session: SessionHandle,
        scheduler: SubscriptionScheduler,
        watchlist: Vec<String>,
        mode: AppMode,
    ) -> Self {
        Self {
            session,
            scheduler,
            watchlist,
            mode,
        }
    }

    /// Run the ready sequence once.
    ///
    /// Returns `None` when the scheduler does not run (light mode).
    ///
    /// # Errors
    ///
    /// Returns the error from loading the symbol list.
    pub async fn on_ready(&self) -> Result<Option<SchedulerReport>, SessionError> {
        let cache = self.session.load_symbols().await?;
        tracing::info!(symbols = cache.len(), mode = self.mode.as_str(), "Symbols loaded");

        if !self.mode.subscribes() {
            tracing::info!("Light mode, skipping spot subscriptions");
            return Ok(None);
        }
        Ok(Some(self.scheduler.run(&self.watchlist).await))
    }

    /// Register for `ready` events and run until cancelled.
    ///
    /// Registration happens before this returns, so a session started
    /// afterwards cannot reach `ready` unobserved.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session loop has stopped.
    pub async fn spawn(self, cancel: CancellationToken) -> Result<JoinHandle<()>, SessionError> {
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let registration = self
            .session
            .on(EventKey::Ready, move |event: &SessionEvent| {
                if let SessionEvent::Ready { account_id } = event {
                    let _ = ready_tx.send(*account_id);
                }
            })
            .await?;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    account_id = ready_rx.recv() => {
                        let Some(account_id) = account_id else { break };
                        tracing::debug!(account_id, "Session ready, bootstrapping market data");
                        if let Err(e) = self.on_ready().await {
                            tracing::warn!(error = %e, "Market data bootstrap failed");
                        }
                    }
                }
            }
            let _ = self.session.off(EventKey::Ready, registration).await;
            tracing::debug!("Market data bootstrap stopped");
        }))
    }
}
