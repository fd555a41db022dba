//! Application Services
//!
//! Orchestration on top of the session handle:
//!
//! - `SubscriptionScheduler`: staggered spot subscriptions feeding the price book
//! - `MarketDataBootstrap`: symbol loading and watchlist subscription on `ready`
//! - `SessionSupervisor`: restart with backoff after `disconnected`

mod bootstrap;
mod scheduler;
mod supervisor;

pub use bootstrap::MarketDataBootstrap;
pub use scheduler::{SchedulerReport, SubscriptionScheduler};
pub use supervisor::SessionSupervisor;
