//! Subscription Scheduler
//!
//! Issues one spot subscription per watched instrument, spaced a fixed
//! interval apart so the venue never sees a burst. The request for the
//! instrument in slot `i` goes out at `start + i * interval`; requests run
//! concurrently once issued, each under its own deadline.
//!
//! The scheduler remembers the tick handler it registered per instrument.
//! While that handler is still registered the venue subscription is live
//! on the current connection, so a rerun (e.g. `ready` after a token
//! refresh) leaves the instrument alone. Teardown drops the handlers, so
//! the next run after a reconnect subscribes again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::application::session::{
    SessionError, SessionHandle, TickSubscription, VenueRequest,
};
use crate::domain::market::{SharedPriceBook, SymbolId};
use crate::domain::symbols::normalize_symbol;
use crate::infrastructure::metrics;

/// Outcome of one scheduler run, in watchlist order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Instruments subscribed with a tick handler registered.
    pub subscribed: Vec<String>,
    /// Instruments already subscribed on the current connection.
    pub already_subscribed: Vec<String>,
    /// Instruments absent from the symbol cache.
    pub skipped: Vec<String>,
    /// Instruments whose subscription failed.
    pub failed: Vec<(String, SessionError)>,
}

/// Staggered spot subscriber feeding a price book.
#[derive(Debug, Clone)]
pub struct SubscriptionScheduler {
    session: SessionHandle,
    prices: SharedPriceBook,
    interval: Duration,
    request_timeout: Option<Duration>,
    active: Arc<Mutex<HashMap<SymbolId, TickSubscription>>>,
}

impl SubscriptionScheduler {
    /// Create a scheduler issuing requests `interval` apart.
    #[must_use]
    pub fn new(session: SessionHandle, prices: SharedPriceBook, interval: Duration) -> Self {
        Self {
            session,
            prices,
            interval,
            request_timeout: None,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Override the per-request deadline (defaults to the session's).
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Subscribe every instrument in `watchlist`.
    ///
    /// Names are normalised and deduplicated, keeping first-seen order.
    /// Unknown names are skipped without sending anything but still use
    /// up their slot. Failures are not retried.
    pub async fn run(&self, watchlist: &[String]) -> SchedulerReport {
        let symbols = self.session.symbols();
        let mut seen = HashSet::new();
        let names: Vec<String> = watchlist
            .iter()
            .map(String::as_str)
            .map(normalize_symbol)
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();

        tracing::info!(
            instruments = names.len(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Starting spot subscriptions"
        );

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        let mut report = SchedulerReport::default();

        for (slot, name) in names.iter().enumerate() {
            let Some(info) = symbols.get(name) else {
                tracing::warn!(symbol = %name, "Unknown symbol, not subscribing");
                metrics::record_subscription("skipped");
                report.skipped.push(name.clone());
                continue;
            };
            if self.is_live(info.symbol_id).await {
                tracing::debug!(symbol = %info.name, "Spot subscription still live");
                metrics::record_subscription("already_subscribed");
                report.already_subscribed.push(info.name.clone());
                continue;
            }

            let offset = self
                .interval
                .saturating_mul(u32::try_from(slot).unwrap_or(u32::MAX));
            tokio::time::sleep_until(start + offset).await;

            let session = self.session.clone();
            let prices = SharedPriceBook::clone(&self.prices);
            let timeout = self.request_timeout;
            let symbol_id = info.symbol_id;
            let symbol = info.name.clone();
            tracing::debug!(symbol = %symbol, symbol_id, slot, "Subscribing to spots");
            let active = Arc::clone(&self.active);
            tasks.spawn(async move {
                let result = subscribe_one(&session, prices, &symbol, symbol_id, timeout)
                    .await
                    .map(|subscription| {
                        active.lock().insert(symbol_id, subscription);
                    });
                (slot, symbol, result)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(error = %e, "Subscription task failed"),
            }
        }
        outcomes.sort_by_key(|(slot, _, _)| *slot);

        for (_, symbol, result) in outcomes {
            match result {
                Ok(()) => {
                    metrics::record_subscription("subscribed");
                    report.subscribed.push(symbol);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Spot subscription failed");
                    metrics::record_subscription("failed");
                    report.failed.push((symbol, e));
                }
            }
        }

        tracing::info!(
            subscribed = report.subscribed.len(),
            already_subscribed = report.already_subscribed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Spot subscriptions complete"
        );
        report
    }

    async fn is_live(&self, symbol_id: SymbolId) -> bool {
        let Some(subscription) = self.active.lock().get(&symbol_id).copied() else {
            return false;
        };
        match self
            .session
            .is_registered(subscription.key(), subscription.handler_id)
            .await
        {
            Ok(true) => true,
            Ok(false) | Err(_) => {
                self.active.lock().remove(&symbol_id);
                false
            }
        }
    }
}

async fn subscribe_one(
    session: &SessionHandle,
    prices: SharedPriceBook,
    symbol: &str,
    symbol_id: SymbolId,
    timeout: Option<Duration>,
) -> Result<TickSubscription, SessionError> {
    let request = VenueRequest::SubscribeSpots {
        symbol_ids: vec![symbol_id],
    };
    session.send(request, timeout).await?;
    session
        .subscribe_ticks(symbol, move |quote| prices.apply(quote))
        .await
}
