//! Session Supervisor
//!
//! The session never reconnects on its own. The supervisor starts it,
//! waits for `disconnected` and starts it again after an exponential
//! backoff. Reaching `ready` resets the backoff.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::session::{EventKey, SessionError, SessionEvent, SessionHandle};
use crate::infrastructure::metrics;
use crate::infrastructure::openapi::reconnect::{ReconnectConfig, ReconnectPolicy};

#[derive(Debug)]
enum Signal {
    Ready,
    Disconnected(String),
}

/// Restart loop around one session.
#[derive(Debug)]
pub struct SessionSupervisor {
    session: SessionHandle,
    policy: ReconnectPolicy,
}

impl SessionSupervisor {
    /// Create a supervisor with the given backoff.
    #[must_use]
    pub const fn new(session: SessionHandle, config: ReconnectConfig) -> Self {
        Self {
            session,
            policy: ReconnectPolicy::new(config),
        }
    }

    /// Register for session events, start the session and supervise it
    /// until `cancel` fires or the attempt limit is reached.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session loop has stopped.
    pub async fn spawn(mut self, cancel: CancellationToken) -> Result<JoinHandle<()>, SessionError> {
        let (signals_tx, mut signals) = mpsc::unbounded_channel();

        let tx = signals_tx.clone();
        let ready = self
            .session
            .on(EventKey::Ready, move |_: &SessionEvent| {
                let _ = tx.send(Signal::Ready);
            })
            .await?;
        let disconnected = self
            .session
            .on(EventKey::Disconnected, move |event: &SessionEvent| {
                if let SessionEvent::Disconnected { reason } = event {
                    let _ = signals_tx.send(Signal::Disconnected(reason.clone()));
                }
            })
            .await?;

        self.session.start()?;

        Ok(tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    () = cancel.cancelled() => break,
                    signal = signals.recv() => signal,
                };
                match signal {
                    None => break,
                    Some(Signal::Ready) => {
                        if self.policy.attempt_count() > 0 {
                            tracing::info!(
                                attempts = self.policy.attempt_count(),
                                "Session recovered"
                            );
                        }
                        self.policy.reset();
                    }
                    Some(Signal::Disconnected(reason)) => {
                        if !self.restart_after_backoff(&reason, &cancel).await {
                            break;
                        }
                    }
                }
            }
            let _ = self.session.off(EventKey::Ready, ready).await;
            let _ = self.session.off(EventKey::Disconnected, disconnected).await;
            tracing::debug!("Session supervisor stopped");
        }))
    }

    async fn restart_after_backoff(&mut self, reason: &str, cancel: &CancellationToken) -> bool {
        let Some(delay) = self.policy.next_delay() else {
            tracing::error!(
                attempts = self.policy.attempt_count(),
                reason,
                "Reconnect attempts exhausted, giving up"
            );
            return false;
        };

        tracing::info!(
            attempt = self.policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason,
            "Reconnecting to venue"
        );
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("Supervisor cancelled during reconnect delay");
                return false;
            }
            () = tokio::time::sleep(delay) => {}
        }

        metrics::record_reconnect();
        if self.session.start().is_err() {
            tracing::debug!("Session loop gone, stopping supervisor");
            return false;
        }
        true
    }
}
