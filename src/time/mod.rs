//! Time keeping for the control loop
//!
//! The control loop has no timer threads. Each iteration compares the
//! current instant from a [`Clock`] against stored timestamps:
//!
//! - health checks run when the check interval has elapsed
//! - sync attempts run when the backoff interval has elapsed
//! - read timeouts and inactivity gaps are measured per poll
//!
//! # Examples
//!
//! ```
//! use fieldlink::time::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.sleep(Duration::from_secs(30));
//! assert_eq!(clock.now() - start, Duration::from_secs(30));
//! ```

mod clock;

pub use self::clock::{Clock, ManualClock, SystemClock};

/// Utility functions for interval bookkeeping
pub mod util {
    use std::time::{Duration, Instant};

    /// Time elapsed from `earlier` to `now`, zero if `earlier` is in the future
    pub fn since(now: Instant, earlier: Instant) -> Duration {
        now.saturating_duration_since(earlier)
    }

    /// Whether strictly more than `interval` has passed since `earlier`
    pub fn exceeded(now: Instant, earlier: Instant, interval: Duration) -> bool {
        since(now, earlier) > interval
    }

    /// Formats a duration as `hh:mm:ss`, hours wrapping at 24
    pub fn format_hms(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        format!(
            "{:02}:{:02}:{:02}",
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60
        )
    }
}
