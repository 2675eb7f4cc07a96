use std::time::{Duration, Instant};

use crate::core::HealthConfig;
use crate::time::util;

/// Link health as seen by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    /// Last time a byte arrived from the peer (or the link was reset)
    pub last_activity: Instant,
    /// Failed exchanges since the last reset
    pub consecutive_errors: u32,
    /// Whether the link is believed to work
    pub is_healthy: bool,
}

impl HealthState {
    /// Time since the last activity
    pub fn silent_for(&self, now: Instant) -> Duration {
        util::since(now, self.last_activity)
    }
}

/// Outcome of one periodic health check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthVerdict {
    /// The link just crossed the silence threshold
    pub went_silent: bool,
    /// The error budget is spent and the link must be reset
    pub needs_reset: bool,
}

/// Tracks link activity and failures and decides when to reset
///
/// ```text
/// HEALTHY --silence--> UNHEALTHY --reset / good probe--> HEALTHY
///                          |
///                    errors >= threshold --> RESET --> HEALTHY (pending probe)
/// ```
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    state: HealthState,
    config: HealthConfig,
    last_check: Instant,
}

impl HealthMonitor {
    /// Creates a healthy monitor; the first check runs one interval after `now`
    pub fn new(config: HealthConfig, now: Instant) -> Self {
        HealthMonitor {
            state: HealthState {
                last_activity: now,
                consecutive_errors: 0,
                is_healthy: true,
            },
            config,
            last_check: now,
        }
    }

    /// Current state
    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Whether the link is believed to work
    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy
    }

    /// Configuration in use
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Bytes arrived from the peer
    pub fn record_activity(&mut self, now: Instant) {
        self.state.last_activity = now;
    }

    /// A complete frame arrived
    pub fn record_success(&mut self, now: Instant) {
        self.state.last_activity = now;
        self.state.is_healthy = true;
    }

    /// An exchange failed at the link level
    pub fn record_failure(&mut self) {
        self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
    }

    /// The link was closed and reopened
    pub fn record_reset(&mut self, now: Instant) {
        self.state.last_activity = now;
        self.state.consecutive_errors = 0;
        self.state.is_healthy = true;
    }

    /// Whether a periodic check is due
    pub fn is_due(&self, now: Instant) -> bool {
        util::since(now, self.last_check) >= self.config.check_interval
    }

    /// Runs the periodic check if it is due
    pub fn check(&mut self, now: Instant) -> Option<HealthVerdict> {
        if !self.is_due(now) {
            return None;
        }
        self.last_check = now;

        let mut verdict = HealthVerdict::default();
        if self.state.is_healthy
            && util::exceeded(now, self.state.last_activity, self.config.silence_threshold)
        {
            self.state.is_healthy = false;
            verdict.went_silent = true;
        }
        verdict.needs_reset = self.state.consecutive_errors >= self.config.error_threshold;
        Some(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, ManualClock};

    fn monitor(clock: &ManualClock) -> HealthMonitor {
        HealthMonitor::new(HealthConfig::default(), clock.now())
    }

    #[test]
    fn test_check_cadence() {
        let clock = ManualClock::new();
        let mut health = monitor(&clock);

        clock.advance(Duration::from_secs(29));
        assert!(health.check(clock.now()).is_none());

        clock.advance(Duration::from_secs(1));
        assert!(health.check(clock.now()).is_some());
        assert!(health.check(clock.now()).is_none());
    }

    #[test]
    fn test_silence_reported_once() {
        let clock = ManualClock::new();
        let mut health = monitor(&clock);

        clock.advance(Duration::from_secs(301));
        let verdict = health.check(clock.now()).unwrap();
        assert!(verdict.went_silent);
        assert!(!health.is_healthy());
        assert_eq!(health.state().consecutive_errors, 0);

        clock.advance(Duration::from_secs(30));
        let verdict = health.check(clock.now()).unwrap();
        assert!(!verdict.went_silent);
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_error_threshold_requests_reset() {
        let clock = ManualClock::new();
        let mut health = monitor(&clock);

        for _ in 0..4 {
            health.record_failure();
        }
        clock.advance(Duration::from_secs(30));
        assert!(!health.check(clock.now()).unwrap().needs_reset);

        health.record_failure();
        clock.advance(Duration::from_secs(30));
        assert!(health.check(clock.now()).unwrap().needs_reset);

        health.record_reset(clock.now());
        assert_eq!(health.state().consecutive_errors, 0);
        assert!(health.is_healthy());
    }

    #[test]
    fn test_success_restores_health() {
        let clock = ManualClock::new();
        let mut health = monitor(&clock);
        clock.advance(Duration::from_secs(400));
        health.check(clock.now());
        assert!(!health.is_healthy());

        health.record_success(clock.now());
        assert!(health.is_healthy());
        assert_eq!(health.state().silent_for(clock.now()), Duration::ZERO);
    }
}
