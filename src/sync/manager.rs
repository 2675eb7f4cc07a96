use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::scheduler::{SyncScheduler, SyncState};
use crate::core::events::SOURCE_TIME;
use crate::core::{Command, EventSink, Result, Severity, SyncConfig};
use crate::protocol::ResponseParser;
use crate::time::util;
use crate::transport::TransportChannel;

/// Failure log cadence; one ERROR event per this many failed attempts
const FAILURE_LOG_EVERY: u32 = 10;

/// Placeholder shown for date or time while unsynchronized
const UNSYNCED: &str = "---";

/// Result of one synchronization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A complete reading was accepted
    Synced,
    /// Half of a two-frame reading arrived
    Partial,
    /// No usable reading
    Failed,
}

/// Runs the time request against the peer on the scheduler's cadence
pub struct TimeSync {
    scheduler: SyncScheduler,
    parser: ResponseParser,
    request: Command,
    timeout: Duration,
    started: Instant,
    events: Arc<dyn EventSink>,
}

impl TimeSync {
    /// Creates the synchronizer; `started` is the reference for uptime display
    pub fn new(config: SyncConfig, started: Instant, events: Arc<dyn EventSink>) -> Result<Self> {
        let request = Command::new(config.request_command.as_str())?;
        let timeout = config.request_timeout;
        Ok(TimeSync {
            scheduler: SyncScheduler::new(config),
            parser: ResponseParser::new(),
            request,
            timeout,
            started,
            events,
        })
    }

    /// Staleness check followed by an attempt when one is due
    pub fn tick(&mut self, transport: &mut TransportChannel) -> Option<SyncOutcome> {
        let now = transport.clock().now();
        if self.scheduler.check_staleness(now) {
            self.events
                .add_log("Time synchronization lost", Severity::Warn, SOURCE_TIME);
        }
        if !self.scheduler.is_due(now) {
            return None;
        }
        self.scheduler.record_attempt(now);
        Some(self.attempt(transport))
    }

    /// One request/parse cycle, regardless of schedule
    pub fn attempt(&mut self, transport: &mut TransportChannel) -> SyncOutcome {
        let frame = match transport.exchange(&self.request, self.timeout) {
            Ok(frame) => frame,
            Err(e) => {
                let failures = self.scheduler.record_failure();
                if failures % FAILURE_LOG_EVERY == 1 {
                    self.events.add_log(
                        &format!("Could not read time from peer (attempt {}): {}", failures, e),
                        Severity::Error,
                        SOURCE_TIME,
                    );
                } else {
                    debug!(failures, error = %e, "time request failed");
                }
                return SyncOutcome::Failed;
            }
        };

        let reading = match self.parser.parse(frame.as_str()) {
            Ok((shape, reading)) => {
                debug!(?shape, ?reading, "time frame parsed");
                reading
            }
            Err(_) => {
                transport.record_malformed();
                self.scheduler.record_failure();
                self.events.add_log(
                    &format!("Unrecognized time format: {}", frame),
                    Severity::Warn,
                    SOURCE_TIME,
                );
                return SyncOutcome::Failed;
            }
        };

        let now = transport.clock().now();
        if self.scheduler.record_reading(reading, now) {
            self.events.add_log(
                &format!(
                    "Time synchronized: {} {}",
                    self.current_date(),
                    self.current_time()
                ),
                Severity::Success,
                SOURCE_TIME,
            );
            SyncOutcome::Synced
        } else {
            SyncOutcome::Partial
        }
    }

    /// Backoff scheduler driving the attempts
    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// Snapshot of the synchronization state
    pub fn state(&self) -> SyncState {
        self.scheduler.state()
    }

    /// Last date, or a placeholder while unsynchronized
    pub fn current_date(&self) -> String {
        let state = self.state();
        match state.last_date {
            Some(date) if state.is_valid => date.to_string(),
            _ => UNSYNCED.to_string(),
        }
    }

    /// Last time, or a placeholder while unsynchronized
    pub fn current_time(&self) -> String {
        let state = self.state();
        match state.last_time {
            Some(time) if state.is_valid => time.to_string(),
            _ => UNSYNCED.to_string(),
        }
    }

    /// Synchronized date and time, or the uptime while unsynchronized
    pub fn current_date_time(&self, now: Instant) -> String {
        if self.state().is_valid {
            format!("{} {}", self.current_date(), self.current_time())
        } else {
            format!("Uptime: {}", util::format_hms(util::since(now, self.started)))
        }
    }

    /// Human readable synchronization summary
    pub fn format_stats(&self, now: Instant) -> String {
        let state = self.state();
        let mut stats = format!(
            "Synchronization: {}\nTotal synchronizations: {}\nFailed attempts: {}\n",
            if state.is_valid { "active" } else { "inactive" },
            state.sync_count,
            state.consecutive_failures,
        );
        if let Some(last) = state.last_success {
            stats.push_str(&format!(
                "Last synchronization: {} seconds ago\n",
                util::since(now, last).as_secs()
            ));
        }
        let shown = |value: Option<String>| value.unwrap_or_default();
        stats.push_str(&format!(
            "Last date: {}\nLast time: {}",
            shown(state.last_date.map(|d| d.to_string())),
            shown(state.last_time.map(|t| t.to_string())),
        ));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, MemorySink};
    use crate::link::{ScriptedLink, ScriptedPeer};
    use crate::time::{Clock, ManualClock};

    fn setup() -> (TimeSync, TransportChannel, ScriptedPeer, ManualClock, MemorySink) {
        let (link, peer) = ScriptedLink::new();
        let clock = ManualClock::new();
        let sink = MemorySink::default();
        let config = Config::default();
        let transport = TransportChannel::new(
            Box::new(link),
            &config,
            Arc::new(clock.clone()),
            Arc::new(sink.clone()),
        )
        .unwrap();
        let sync = TimeSync::new(config.sync, clock.now(), Arc::new(sink.clone())).unwrap();
        (sync, transport, peer, clock, sink)
    }

    #[test]
    fn test_successful_sync() {
        let (mut sync, mut transport, peer, clock, sink) = setup();
        peer.reply("DATE:010125,TIME:235959\n");

        assert_eq!(sync.tick(&mut transport), Some(SyncOutcome::Synced));
        assert_eq!(peer.written(), vec!["GETTIME"]);
        assert_eq!(sync.current_date_time(clock.now()), "01.01.2025 23:59:59");
        assert_eq!(sink.count(Severity::Success, SOURCE_TIME), 1);

        // Not due again until the refresh interval passes
        assert_eq!(sync.tick(&mut transport), None);
    }

    #[test]
    fn test_two_frame_reading() {
        let (mut sync, mut transport, peer, _, _) = setup();
        peer.reply("010125A").reply("120000a");

        assert_eq!(sync.attempt(&mut transport), SyncOutcome::Partial);
        assert!(!sync.state().is_valid);
        assert_eq!(sync.attempt(&mut transport), SyncOutcome::Synced);
        assert!(sync.state().is_valid);
    }

    #[test]
    fn test_unrecognized_frame() {
        let (mut sync, mut transport, peer, _, sink) = setup();
        peer.reply("HELLO\n");

        assert_eq!(sync.attempt(&mut transport), SyncOutcome::Failed);
        let state = sync.state();
        assert_eq!(state.consecutive_failures, 1);
        assert!(state.last_date.is_none());
        assert_eq!(transport.statistics().frame_errors, 1);
        // A format mismatch is not a link problem
        assert_eq!(transport.health().consecutive_errors, 0);
        assert_eq!(sink.count(Severity::Warn, SOURCE_TIME), 1);
    }

    #[test]
    fn test_failure_logging_is_throttled() {
        let (mut sync, mut transport, _, _, sink) = setup();
        for _ in 0..11 {
            assert_eq!(sync.attempt(&mut transport), SyncOutcome::Failed);
        }
        // Attempts 1 and 11
        assert_eq!(sink.count(Severity::Error, SOURCE_TIME), 2);
    }

    #[test]
    fn test_unsynced_display() {
        let (sync, _, _, clock, _) = setup();
        clock.advance(Duration::from_secs(3_725));
        assert_eq!(sync.current_date_time(clock.now()), "Uptime: 01:02:05");
        assert_eq!(sync.current_date(), "---");

        let stats = sync.format_stats(clock.now());
        assert!(stats.starts_with("Synchronization: inactive"));
        assert!(!stats.contains("Last synchronization"));
    }
}
