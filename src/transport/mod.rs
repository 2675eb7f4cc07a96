//! Request/response transport over the peer link
//!
//! [`TransportChannel`] owns the link exclusively and runs one exchange at a
//! time: drop stale input, write the command, read one frame. Every exchange
//! updates the [`StatisticsTracker`] and the [`HealthMonitor`], and an
//! unhealthy link is reset before the next command goes out.

mod channel;
mod health;
mod stats;

pub use self::channel::TransportChannel;
pub use self::health::{HealthMonitor, HealthState, HealthVerdict};
pub use self::stats::{Statistics, StatisticsTracker};
