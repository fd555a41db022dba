//! Request Correlator
//!
//! Tracks in-flight requests by correlation id, each with its own deadline.
//!
//! # Completion
//!
//! A pending entry leaves the correlator exactly once, through one of:
//!
//! - [`Correlator::resolve`] when a response with its id arrives
//! - [`Correlator::poll_expired`] when its deadline fires
//! - [`Correlator::fail_all`] when the session is torn down
//!
//! Resolving removes the deadline from the timer queue, so a timeout can
//! never fire for an answered request. A response for an id that has
//! already left (for example after its timeout) finds nothing and is
//! discarded by the caller.

use std::collections::HashMap;
use std::future::poll_fn;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;

/// Per-session correlation id, sent as `clientMsgId`.
pub type CorrelationId = u64;

/// A pending entry with its deadline.
#[derive(Debug)]
pub struct Pending<T> {
    /// Correlation id.
    pub id: CorrelationId,
    /// Timeout the entry was registered with.
    pub timeout: Duration,
    /// Caller-defined completion payload.
    pub payload: T,
    key: Key,
}

/// Correlation table plus deadline queue.
#[derive(Debug)]
pub struct Correlator<T> {
    pending: HashMap<CorrelationId, Pending<T>>,
    deadlines: DelayQueue<CorrelationId>,
    next_id: CorrelationId,
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Correlator<T> {
    /// Create an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            deadlines: DelayQueue::new(),
            next_id: 0,
        }
    }

    /// Register a new pending entry and return its fresh id.
    ///
    /// Ids increase monotonically and are never reused within a correlator.
    pub fn register(&mut self, timeout: Duration, payload: T) -> CorrelationId {
        self.next_id += 1;
        let id = self.next_id;
        let key = self.deadlines.insert(id, timeout);
        self.pending.insert(
            id,
            Pending {
                id,
                timeout,
                payload,
                key,
            },
        );
        id
    }

    /// Take the entry for a response, cancelling its deadline.
    pub fn resolve(&mut self, id: CorrelationId) -> Option<Pending<T>> {
        let entry = self.pending.remove(&id)?;
        // Keys of entries still in `pending` are always live in the queue.
        self.deadlines.remove(&entry.key);
        Some(entry)
    }

    /// Take the entry for a response id as received on the wire.
    pub fn resolve_str(&mut self, id: Option<&str>) -> Option<Pending<T>> {
        let id = id?.trim().parse::<CorrelationId>().ok()?;
        self.resolve(id)
    }

    /// Poll for the next entry whose deadline has fired.
    ///
    /// Returns `Poll::Pending` while nothing is outstanding.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Pending<T>> {
        loop {
            match self.deadlines.poll_expired(cx) {
                Poll::Ready(Some(expired)) => {
                    if let Some(entry) = self.pending.remove(expired.get_ref()) {
                        return Poll::Ready(entry);
                    }
                }
                Poll::Ready(None) | Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Wait for the next expired entry.
    pub async fn next_expired(&mut self) -> Pending<T> {
        poll_fn(|cx| self.poll_expired(cx)).await
    }

    /// Take every outstanding entry (session teardown).
    pub fn fail_all(&mut self) -> Vec<Pending<T>> {
        self.deadlines.clear();
        let mut drained: Vec<Pending<T>> = self.pending.drain().map(|(_, p)| p).collect();
        drained.sort_by_key(|p| p.id);
        drained
    }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether an id is outstanding.
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.pending.contains_key(&id)
    }
}
