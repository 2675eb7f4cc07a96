use std::time::{Duration, Instant};

use chrono::NaiveDateTime;

use crate::core::SyncConfig;
use crate::protocol::parser::to_datetime;
use crate::protocol::{DateValue, Reading, TimeValue};
use crate::time::util;

/// Retry phase of the synchronization schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Unsynchronized, retrying at the fast interval
    FastRetry,
    /// Unsynchronized, fast retries used up
    SlowRetry,
    /// Synchronized, refreshing at the refresh interval
    Synced,
}

/// Inputs that move the schedule between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// A complete reading was accepted
    Success,
    /// An attempt failed
    Failure,
    /// The last success aged past the staleness window
    Stale,
}

impl SyncPhase {
    /// Transition table. `failures` is the consecutive failure count after
    /// the event was applied.
    ///
    /// | from            | event   | to                                   |
    /// |-----------------|---------|--------------------------------------|
    /// | any             | Success | Synced                               |
    /// | Synced          | Failure | Synced                               |
    /// | Fast/SlowRetry  | Failure | SlowRetry if failures >= limit, else FastRetry |
    /// | Synced          | Stale   | SlowRetry if failures >= limit, else FastRetry |
    /// | Fast/SlowRetry  | Stale   | unchanged                            |
    pub fn next(self, event: SyncEvent, failures: u32, fast_retry_limit: u32) -> SyncPhase {
        let unsynced = if failures >= fast_retry_limit {
            SyncPhase::SlowRetry
        } else {
            SyncPhase::FastRetry
        };
        match (self, event) {
            (_, SyncEvent::Success) => SyncPhase::Synced,
            (SyncPhase::Synced, SyncEvent::Failure) => SyncPhase::Synced,
            (_, SyncEvent::Failure) => unsynced,
            (SyncPhase::Synced, SyncEvent::Stale) => unsynced,
            (phase, SyncEvent::Stale) => phase,
        }
    }
}

/// Synchronization state as observed from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Whether the last complete reading is fresh enough to trust
    pub is_valid: bool,
    /// Last date received
    pub last_date: Option<DateValue>,
    /// Last time received
    pub last_time: Option<TimeValue>,
    /// When the last complete reading was accepted
    pub last_success: Option<Instant>,
    /// Failed attempts since the last success
    pub consecutive_failures: u32,
    /// Complete readings accepted so far
    pub sync_count: u64,
}

impl SyncState {
    /// The synchronized calendar time, if valid and both halves are usable
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        if !self.is_valid {
            return None;
        }
        to_datetime(self.last_date?, self.last_time?)
    }
}

/// Decides when to attempt synchronization and when it is lost
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    config: SyncConfig,
    phase: SyncPhase,
    state: SyncState,
    last_attempt: Option<Instant>,
    /// A date-only frame arrived and awaits its time
    date_pending: bool,
}

impl SyncScheduler {
    /// Starts in fast retry with nothing synchronized
    pub fn new(config: SyncConfig) -> Self {
        SyncScheduler {
            config,
            phase: SyncPhase::FastRetry,
            state: SyncState::default(),
            last_attempt: None,
            date_pending: false,
        }
    }

    /// Current backoff phase
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Snapshot of the synchronization state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Intervals and thresholds in use
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Interval between attempts in the current phase
    pub fn interval(&self) -> Duration {
        match self.phase {
            SyncPhase::FastRetry => self.config.fast_interval,
            SyncPhase::SlowRetry => self.config.slow_interval,
            SyncPhase::Synced => self.config.refresh_interval,
        }
    }

    /// Whether an attempt is due. The first attempt is due at once.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(at) => util::exceeded(now, at, self.interval()),
        }
    }

    /// Marks the start of an attempt
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Applies a parsed reading. Returns whether it completed a reading,
    /// in which case synchronization is (re)established.
    pub fn record_reading(&mut self, reading: Reading, now: Instant) -> bool {
        let complete = match reading {
            Reading::Full { date, time } => {
                self.state.last_date = Some(date);
                self.state.last_time = Some(time);
                true
            }
            Reading::DateOnly(date) => {
                self.state.last_date = Some(date);
                self.date_pending = true;
                false
            }
            Reading::TimeOnly(time) => {
                self.state.last_time = Some(time);
                !self.config.require_date_before_time || self.date_pending
            }
        };
        if complete {
            self.date_pending = false;
            self.state.is_valid = true;
            self.state.last_success = Some(now);
            self.state.consecutive_failures = 0;
            self.state.sync_count += 1;
            self.apply(SyncEvent::Success);
        }
        complete
    }

    /// Counts a failed attempt and returns the new failure count
    pub fn record_failure(&mut self) -> u32 {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        self.apply(SyncEvent::Failure);
        self.state.consecutive_failures
    }

    /// Revokes validity when the last success is older than the staleness
    /// window. Returns true on the transition only.
    pub fn check_staleness(&mut self, now: Instant) -> bool {
        let Some(last) = self.state.last_success else {
            return false;
        };
        if !self.state.is_valid || !util::exceeded(now, last, self.config.staleness_window) {
            return false;
        }
        self.state.is_valid = false;
        self.apply(SyncEvent::Stale);
        true
    }

    fn apply(&mut self, event: SyncEvent) {
        self.phase = self.phase.next(
            event,
            self.state.consecutive_failures,
            self.config.fast_retry_limit,
        );
    }
}
