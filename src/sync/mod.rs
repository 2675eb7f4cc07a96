//! Synchronization module
//!
//! This module keeps the controller's notion of calendar time in step with
//! the peer. [`SyncScheduler`] is the backoff state machine:
//!
//! ```text
//! FAST_RETRY --failures >= limit--> SLOW_RETRY
//!     |                                 |
//!     +------ complete reading ---------+--> SYNCED --stale--> FAST/SLOW_RETRY
//! ```
//!
//! [`TimeSync`] drives it against a transport.

mod manager;
mod scheduler;

pub use self::manager::{SyncOutcome, TimeSync};
pub use self::scheduler::{SyncEvent, SyncPhase, SyncScheduler, SyncState};
