use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use super::health::{HealthMonitor, HealthState, HealthVerdict};
use super::stats::{Statistics, StatisticsTracker};
use crate::core::events::SOURCE_LINK;
use crate::core::{
    Command, Config, Error, EventSink, HealthConfig, ResponseFrame, Result, Severity,
    TransportConfig,
};
use crate::link::Link;
use crate::protocol::FrameCodec;
use crate::time::{util, Clock};

/// Upper bound on drain reads when discarding stale input
const MAX_DRAIN_ROUNDS: usize = 64;

/// Bytes of unsolicited data a probe looks at
const PROBE_PEEK_LEN: usize = 50;

/// Owns the physical link and provides the request/response exchange
///
/// All link access goes through one `&mut self`, so frame boundaries can
/// never interleave. Callers that share a channel between threads must put
/// it behind a single lock.
pub struct TransportChannel {
    /// Physical link
    link: Box<dyn Link>,
    /// Inbound framing state
    codec: FrameCodec,
    /// Bytes read but not yet framed
    rx: BytesMut,
    /// Link health
    health: HealthMonitor,
    /// Transmission counters
    stats: StatisticsTracker,
    /// Timing settings
    config: TransportConfig,
    /// Probe sent while the link is unhealthy
    probe_command: Option<Command>,
    /// Probe timeout
    probe_timeout: Duration,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Event sink
    events: Arc<dyn EventSink>,
}

impl TransportChannel {
    /// Creates a channel over an already opened link
    pub fn new(
        link: Box<dyn Link>,
        config: &Config,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Self::with_parts(link, config.transport.clone(), config.health.clone(), clock, events)
    }

    /// Creates a channel from the transport and health sections
    pub fn with_parts(
        link: Box<dyn Link>,
        transport: TransportConfig,
        health: HealthConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let probe_command = health
            .probe_command
            .as_deref()
            .map(Command::new)
            .transpose()?;
        let now = clock.now();
        Ok(TransportChannel {
            link,
            codec: FrameCodec::with_max_len(transport.max_frame_len),
            rx: BytesMut::with_capacity(transport.max_frame_len),
            probe_command,
            probe_timeout: health.probe_timeout,
            health: HealthMonitor::new(health, now),
            stats: StatisticsTracker::new(),
            config: transport,
            clock,
            events,
        })
    }

    /// Sends `command` and waits up to `timeout` for the reply frame.
    /// A zero timeout selects the configured default.
    ///
    /// An unhealthy link is reset first; if the link still refuses the
    /// write, the error is [`Error::LinkUnhealthy`]. `frames_sent` grows by
    /// exactly one per call whatever the outcome.
    pub fn exchange(&mut self, command: &Command, timeout: Duration) -> Result<ResponseFrame> {
        if self.health.is_healthy() {
            return self.transact(command, timeout);
        }
        self.reset();
        self.transact(command, timeout).map_err(|e| match e {
            Error::Link(msg) => {
                Error::unhealthy(format!("{} after reset: {}", self.link.describe(), msg))
            }
            other => other,
        })
    }

    /// Validates `text` as a command, then exchanges it. Invalid text fails
    /// without touching the link.
    pub fn send(&mut self, text: &str, timeout: Duration) -> Result<ResponseFrame> {
        let command = Command::new(text)?;
        self.exchange(&command, timeout)
    }

    /// Closes and reopens the link, drops buffered input and clears the
    /// error budget. A failed reopen is logged; the next exchange still
    /// tries to transmit.
    pub fn reset(&mut self) {
        self.events
            .add_log("Resetting link", Severity::Warn, SOURCE_LINK);

        self.link.close();
        self.clock.sleep(self.config.settle_delay);
        if let Err(e) = self.link.open() {
            self.events.add_log(
                &format!("Reopening {} failed: {}", self.link.describe(), e),
                Severity::Error,
                SOURCE_LINK,
            );
        }
        self.clock.sleep(self.config.settle_delay);
        self.discard_input();

        self.health.record_reset(self.clock.now());
        self.events
            .add_log("Link reset complete", Severity::Success, SOURCE_LINK);
        self.clock.sleep(self.config.post_reset_delay);
    }

    /// Runs the periodic health check when its interval has elapsed
    pub fn run_health_check(&mut self) -> Option<HealthVerdict> {
        let now = self.clock.now();
        let verdict = self.health.check(now)?;

        if verdict.went_silent {
            self.events.add_log(
                &format!(
                    "Link silent for {} seconds",
                    self.health.state().silent_for(now).as_secs()
                ),
                Severity::Warn,
                SOURCE_LINK,
            );
        }
        if verdict.needs_reset {
            self.events.add_log(
                &format!(
                    "Too many link errors ({}), resetting",
                    self.health.state().consecutive_errors
                ),
                Severity::Warn,
                SOURCE_LINK,
            );
            self.reset();
        }
        if !self.health.is_healthy() {
            self.events
                .add_log("Probing link health", Severity::Info, SOURCE_LINK);
            self.probe();
        }
        Some(verdict)
    }

    /// Tries to get any sign of life from the peer. Unsolicited bytes
    /// already on the wire count; otherwise the probe command is exchanged.
    pub fn probe(&mut self) -> bool {
        let mut peek = [0u8; PROBE_PEEK_LEN];
        let seen = match self.link.read_available(&mut peek) {
            Ok(n) => ResponseFrame::from_printable(
                &peek[..n]
                    .iter()
                    .copied()
                    .filter(|b| crate::core::types::is_printable(*b))
                    .collect::<Vec<u8>>(),
            ),
            Err(_) => None,
        };
        if let Some(data) = seen {
            self.health.record_success(self.clock.now());
            self.events.add_log(
                &format!("Data pending on link: '{}'", data),
                Severity::Success,
                SOURCE_LINK,
            );
            return true;
        }

        let Some(command) = self.probe_command.clone() else {
            return false;
        };
        match self.transact(&command, self.probe_timeout) {
            Ok(frame) => {
                self.events.add_log(
                    &format!("Probe answered: '{}'", frame),
                    Severity::Success,
                    SOURCE_LINK,
                );
                true
            }
            Err(e) => {
                self.events.add_log(
                    &format!("Probe failed: {}", e),
                    Severity::Warn,
                    SOURCE_LINK,
                );
                false
            }
        }
    }

    /// Counts a frame that arrived but could not be used by the caller.
    /// Health is not affected.
    pub fn record_malformed(&mut self) {
        self.stats.record_frame_error();
    }

    /// Current transmission counters
    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// Current link health
    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    /// Time source shared with the channel
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Describes the underlying link
    pub fn describe(&self) -> String {
        self.link.describe()
    }

    /// Human readable status summary
    pub fn format_status(&self) -> String {
        let now = self.clock.now();
        let health = self.health.state();
        let stats = self.stats.snapshot();
        format!(
            "Link status ({}):\n\
             Health: {}\n\
             Last activity: {} seconds ago\n\
             Error count: {}\n\
             Success rate: {:.1}%\n\
             Sent: {}\n\
             Received: {}\n\
             Timeouts: {}",
            self.link.describe(),
            if health.is_healthy { "good" } else { "bad" },
            health.silent_for(now).as_secs(),
            health.consecutive_errors,
            stats.success_rate,
            stats.frames_sent,
            stats.frames_received,
            stats.timeout_errors,
        )
    }

    /// One write/read cycle without the health prelude
    fn transact(&mut self, command: &Command, timeout: Duration) -> Result<ResponseFrame> {
        let timeout = if timeout.is_zero() {
            self.config.default_timeout
        } else {
            timeout
        };

        self.discard_input();

        let mut out = BytesMut::with_capacity(command.as_bytes().len());
        self.codec.encode(command, &mut out)?;
        self.stats.record_sent();
        if let Err(e) = self.link.write_all(&out) {
            self.health.record_failure();
            debug!(%command, error = %e, "write failed");
            return Err(e);
        }
        trace!(%command, "frame written");

        match self.read_frame(timeout) {
            Ok(Some(frame)) => {
                self.health.record_success(self.clock.now());
                self.stats.record_received();
                debug!(%command, response = %frame, "exchange complete");
                Ok(frame)
            }
            Ok(None) => {
                self.stats.record_timeout();
                self.health.record_failure();
                debug!(%command, ?timeout, "no response");
                Err(Error::Timeout(timeout))
            }
            Err(e) => {
                self.health.record_failure();
                debug!(%command, error = %e, "read failed");
                Err(e)
            }
        }
    }

    /// Reads one frame: up to a terminator, the length limit, an inactivity
    /// gap after data started, or the timeout. `None` means nothing usable
    /// arrived.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<ResponseFrame>> {
        let start = self.clock.now();
        let mut last_byte: Option<Instant> = None;
        let mut scratch = [0u8; 64];

        loop {
            let now = self.clock.now();
            if util::since(now, start) >= timeout {
                break;
            }

            let n = self.link.read_available(&mut scratch)?;
            if n > 0 {
                self.health.record_activity(now);
                last_byte = Some(now);
                self.rx.extend_from_slice(&scratch[..n]);
                if let Some(frame) = self.codec.decode(&mut self.rx)? {
                    return Ok(Some(frame));
                }
                continue;
            }

            if let Some(at) = last_byte {
                if self.codec.has_partial()
                    && util::since(now, at) >= self.config.inactivity_gap
                {
                    return self.codec.decode_eof(&mut self.rx);
                }
            }
            self.clock.sleep(self.config.poll_interval);
        }

        // Out of time; whatever arrived is the answer
        self.codec.decode_eof(&mut self.rx)
    }

    /// Waits for the peer to finish talking, then drops everything buffered
    fn discard_input(&mut self) {
        self.clock.sleep(self.config.clear_delay);
        self.codec.reset();
        self.rx.clear();

        let mut scratch = [0u8; 64];
        let mut discarded = 0usize;
        for _ in 0..MAX_DRAIN_ROUNDS {
            match self.link.read_available(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    discarded += n;
                    self.clock.sleep(Duration::from_millis(1));
                }
            }
        }
        if discarded > 0 {
            debug!(discarded, "dropped stale input");
        }
    }
}
