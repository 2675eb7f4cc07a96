use serde::{Deserialize, Serialize};

/// Transmission counters for the link
///
/// Counters only ever grow. `success_rate` is derived after every update as
/// `(total - errors) / total * 100` with `total = sent + received`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Frames written to the link
    pub frames_sent: u64,
    /// Non-empty frames read from the link
    pub frames_received: u64,
    /// Frames received but rejected by the caller
    pub frame_errors: u64,
    /// Integrity failures; the peer protocol carries no checksum, so this
    /// stays at zero unless a caller reports one
    pub checksum_errors: u64,
    /// Exchanges that ended without a frame
    pub timeout_errors: u64,
    /// Derived success rate in percent
    pub success_rate: f64,
}

impl Statistics {
    /// Sum of all error counters
    pub fn errors(&self) -> u64 {
        self.frame_errors + self.checksum_errors + self.timeout_errors
    }

    /// Frames sent plus frames received
    pub fn total(&self) -> u64 {
        self.frames_sent + self.frames_received
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Statistics {
            frames_sent: 0,
            frames_received: 0,
            frame_errors: 0,
            checksum_errors: 0,
            timeout_errors: 0,
            success_rate: 100.0,
        }
    }
}

/// Owns the link statistics
#[derive(Debug, Clone, Default)]
pub struct StatisticsTracker {
    stats: Statistics,
}

impl StatisticsTracker {
    /// Creates a tracker with zeroed counters
    pub fn new() -> Self {
        StatisticsTracker::default()
    }

    /// Counts one written frame
    pub fn record_sent(&mut self) {
        self.stats.frames_sent += 1;
        self.recompute();
    }

    /// Counts one received frame
    pub fn record_received(&mut self) {
        self.stats.frames_received += 1;
        self.recompute();
    }

    /// Counts an exchange that timed out
    pub fn record_timeout(&mut self) {
        self.stats.timeout_errors += 1;
        self.recompute();
    }

    /// Counts a frame that arrived but was unusable
    pub fn record_frame_error(&mut self) {
        self.stats.frame_errors += 1;
        self.recompute();
    }

    /// Counts a frame that failed an integrity check
    pub fn record_checksum_error(&mut self) {
        self.stats.checksum_errors += 1;
        self.recompute();
    }

    /// Current counters
    pub fn snapshot(&self) -> Statistics {
        self.stats
    }

    fn recompute(&mut self) {
        let total = self.stats.total();
        if total > 0 {
            let good = total.saturating_sub(self.stats.errors());
            self.stats.success_rate = good as f64 / total as f64 * 100.0;
        }
    }
}
