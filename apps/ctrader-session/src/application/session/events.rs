//! Event Dispatcher
//!
//! Publish/subscribe registry for session events. Keys combine an event
//! category with, for ticks, the venue instrument id (`tick:42`).
//!
//! Handlers run on the session loop task, in registration order, and must
//! not block. A panicking handler is logged and skipped; the remaining
//! handlers still run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::SessionError;
use crate::domain::market::{SpotTick, SymbolId};

/// Event channel key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Session reached `Ready`.
    Ready,
    /// Non-request-scoped error.
    Error,
    /// Session torn down.
    Disconnected,
    /// Spot ticks for one instrument.
    Tick(SymbolId),
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Error => f.write_str("error"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Tick(id) => write!(f, "tick:{id}"),
        }
    }
}

/// Event delivered to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Both auth steps succeeded.
    Ready {
        /// Account id echoed by the venue.
        account_id: i64,
    },
    /// Something went wrong outside any caller's request.
    Error(SessionError),
    /// The session was torn down.
    Disconnected {
        /// Why.
        reason: String,
    },
    /// Spot price push.
    Tick(SpotTick),
}

impl SessionEvent {
    /// Key this event is dispatched under.
    #[must_use]
    pub const fn key(&self) -> EventKey {
        match self {
            Self::Ready { .. } => EventKey::Ready,
            Self::Error(_) => EventKey::Error,
            Self::Disconnected { .. } => EventKey::Disconnected,
            Self::Tick(tick) => EventKey::Tick(tick.symbol_id),
        }
    }
}

/// Event handler callback.
pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Registration token returned by `on`, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Handler registry owned by the session loop.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKey, Vec<(HandlerId, EventHandler)>>,
    next_id: u64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("keys", &self.handlers.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl Dispatcher {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; several handlers per key are allowed.
    pub fn on(&mut self, key: EventKey, handler: EventHandler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.entry(key).or_default().push((id, handler));
        id
    }

    /// Deregister one handler. Returns whether it was registered.
    pub fn off(&mut self, key: EventKey, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(&key);
        }
        removed
    }

    /// Deliver an event to every handler under its key.
    ///
    /// Returns the number of handlers that ran to completion.
    pub fn emit(&self, event: &SessionEvent) -> usize {
        let key = event.key();
        let Some(list) = self.handlers.get(&key) else {
            return 0;
        };
        let mut delivered = 0;
        for (id, handler) in list {
            match catch_unwind(AssertUnwindSafe(|| (**handler)(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(key = %key, handler = id.0, "Event handler panicked");
                }
            }
        }
        delivered
    }

    /// Whether handler `id` is still registered under `key`.
    #[must_use]
    pub fn is_registered(&self, key: EventKey, id: HandlerId) -> bool {
        self.handlers
            .get(&key)
            .is_some_and(|list| list.iter().any(|(handler_id, _)| *handler_id == id))
    }

    /// Number of handlers under a key.
    #[must_use]
    pub fn handler_count(&self, key: EventKey) -> usize {
        self.handlers.get(&key).map_or(0, Vec::len)
    }

    /// Number of instruments with at least one tick handler.
    #[must_use]
    pub fn tick_subscriptions(&self) -> usize {
        self.handlers
            .keys()
            .filter(|k| matches!(k, EventKey::Tick(_)))
            .count()
    }

    /// Drop every tick handler (session teardown).
    pub fn clear_ticks(&mut self) -> usize {
        let before = self.tick_subscriptions();
        self.handlers.retain(|k, _| !matches!(k, EventKey::Tick(_)));
        before
    }

    /// Drop tick handlers whose instrument fails `keep`.
    pub fn retain_ticks<F>(&mut self, keep: F) -> usize
    where
        F: Fn(SymbolId) -> bool,
    {
        let before = self.handlers.len();
        self.handlers.retain(|k, _| match k {
            EventKey::Tick(id) => keep(*id),
            _ => true,
        });
        before - self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn tick(symbol_id: SymbolId) -> SessionEvent {
        SessionEvent::Tick(SpotTick {
            symbol_id,
            bid: Some(1),
            ask: Some(2),
            timestamp_ms: None,
        })
    }

    fn counter() -> (Arc<AtomicUsize>, EventHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: EventHandler = Arc::new(move |_: &SessionEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn tick_delivered_only_to_matching_key() {
        let mut dispatcher = Dispatcher::new();
        let (a, ha) = counter();
        let (b, hb) = counter();
        let (other, ho) = counter();
        dispatcher.on(EventKey::Tick(42), ha);
        dispatcher.on(EventKey::Tick(42), hb);
        dispatcher.on(EventKey::Tick(7), ho);

        assert_eq!(dispatcher.emit(&tick(42)), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registration_tracked_until_ticks_cleared() {
        let mut dispatcher = Dispatcher::new();
        let (_, handler) = counter();
        let id = dispatcher.on(EventKey::Tick(42), handler);

        assert!(dispatcher.is_registered(EventKey::Tick(42), id));
        assert!(!dispatcher.is_registered(EventKey::Tick(7), id));

        dispatcher.clear_ticks();
        assert!(!dispatcher.is_registered(EventKey::Tick(42), id));
    }

    #[test]
    fn unregistered_key_dropped() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.emit(&tick(1)), 0);
    }

    #[test]
    fn off_removes_one_handler() {
        let mut dispatcher = Dispatcher::new();
        let (a, ha) = counter();
        let (b, hb) = counter();
        let id_a = dispatcher.on(EventKey::Ready, ha);
        dispatcher.on(EventKey::Ready, hb);

        assert!(dispatcher.off(EventKey::Ready, id_a));
        assert!(!dispatcher.off(EventKey::Ready, id_a));
        dispatcher.emit(&SessionEvent::Ready { account_id: 1 });
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut dispatcher = Dispatcher::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            dispatcher.on(EventKey::Error, Arc::new(move |_: &SessionEvent| order.lock().push(n)));
        }
        dispatcher.emit(&SessionEvent::Error(SessionError::Closed));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let mut dispatcher = Dispatcher::new();
        let (count, handler) = counter();
        dispatcher.on(EventKey::Tick(1), Arc::new(|_: &SessionEvent| panic!("boom")));
        dispatcher.on(EventKey::Tick(1), handler);

        assert_eq!(dispatcher.emit(&tick(1)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_and_retain_ticks_keep_control_channels() {
        let mut dispatcher = Dispatcher::new();
        let (_, h) = counter();
        dispatcher.on(EventKey::Ready, Arc::clone(&h));
        dispatcher.on(EventKey::Tick(1), Arc::clone(&h));
        dispatcher.on(EventKey::Tick(2), Arc::clone(&h));

        assert_eq!(dispatcher.retain_ticks(|id| id == 1), 1);
        assert_eq!(dispatcher.tick_subscriptions(), 1);
        assert_eq!(dispatcher.clear_ticks(), 1);
        assert_eq!(dispatcher.tick_subscriptions(), 0);
        assert_eq!(dispatcher.handler_count(EventKey::Ready), 1);
    }

    #[test]
    fn key_display() {
        assert_eq!(EventKey::Tick(42).to_string(), "tick:42");
        assert_eq!(EventKey::Ready.to_string(), "ready");
    }
}
