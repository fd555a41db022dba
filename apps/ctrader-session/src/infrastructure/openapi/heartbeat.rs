//! Heartbeat Monitor
//!
//! Tracks liveness of the venue connection. The session core sends a
//! heartbeat event on every interval tick and tears the connection down
//! once nothing at all has been received for `timeout`.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between outbound heartbeat events.
    pub interval: Duration,
    /// Silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Build the tick source for outbound heartbeats.
    ///
    /// Missed ticks are skipped; the first tick fires one interval from now.
    #[must_use]
    pub fn ticker(&self) -> Interval {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }
}

/// Inbound liveness state for one connection.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last_inbound: Instant,
}

impl HeartbeatMonitor {
    /// Create a monitor that counts from now.
    #[must_use]
    pub fn new(config: &HeartbeatConfig) -> Self {
        Self {
            timeout: config.timeout,
            last_inbound: Instant::now(),
        }
    }

    /// Record that a frame was received.
    pub fn record_inbound(&mut self) {
        self.last_inbound = Instant::now();
    }

    /// Reset for a new connection.
    pub fn reset(&mut self) {
        self.record_inbound();
    }

    /// Time since the last received frame.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_inbound.elapsed()
    }

    /// Whether the connection has been silent for longer than the timeout.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.silence() >= self.timeout
    }
}
