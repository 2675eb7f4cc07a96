//! Controller facade
//!
//! [`Controller`] is constructed once at start-up and owns the transport and
//! the time synchronizer. Every inbound operation goes through it; the
//! control loop calls [`Controller::poll`] on a fixed tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::core::events::{SOURCE_LINK, SOURCE_PUSH};
use crate::core::{Config, Error, EventSink, PushConfig, ResponseFrame, Result, Severity};
use crate::link::Link;
use crate::protocol::fault;
use crate::protocol::{ConfigPushEncoder, ServerSlot};
use crate::sync::{SyncOutcome, SyncState, TimeSync};
use crate::time::Clock;
use crate::transport::{HealthState, HealthVerdict, Statistics, TransportChannel};

/// What one control loop iteration did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Verdict of the health check, if one was due
    pub health: Option<HealthVerdict>,
    /// Outcome of the sync attempt, if one was due
    pub sync: Option<SyncOutcome>,
}

/// Single owner of the link and everything layered on it
pub struct Controller {
    transport: TransportChannel,
    sync: TimeSync,
    encoder: ConfigPushEncoder,
    push: PushConfig,
    control_tick: Duration,
    last_fault: Option<ResponseFrame>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl Controller {
    /// Builds a controller over an opened link
    pub fn new(
        config: Config,
        link: Box<dyn Link>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let transport = TransportChannel::new(link, &config, clock.clone(), events.clone())?;
        let sync = TimeSync::new(config.sync, clock.now(), events.clone())?;
        Ok(Controller {
            transport,
            sync,
            encoder: ConfigPushEncoder::new(),
            push: config.push,
            control_tick: config.control_tick,
            last_fault: None,
            clock,
            events,
        })
    }

    /// Sends a raw command and returns the peer's reply. A zero timeout
    /// selects the default.
    pub fn exchange(&mut self, command: &str, timeout: Duration) -> Result<ResponseFrame> {
        self.transport.send(command, timeout)
    }

    /// Pushes one time server address into `slot` as two frames
    ///
    /// The second frame goes out only after the first exchange has
    /// completed and the inter-command delay has passed. Nothing is
    /// retried; a push where only one frame got through is reported as
    /// [`Error::PartialPush`].
    pub fn push_config(&mut self, address: &str, slot: ServerSlot) -> Result<()> {
        let commands = match self.encoder.encode(address, slot) {
            Ok(commands) => commands,
            Err(e) => {
                self.events.add_log(
                    &format!("Invalid {} time server '{}': {}", slot, address, e),
                    Severity::Error,
                    SOURCE_PUSH,
                );
                return Err(e);
            }
        };

        let total = commands.len();
        let mut delivered = 0;
        for (i, command) in commands.iter().enumerate() {
            if i > 0 {
                self.clock.sleep(self.push.inter_command_delay);
            }
            match self.transport.exchange(command, self.push.frame_timeout) {
                Ok(_) => {
                    delivered += 1;
                    self.events.add_log(
                        &format!("{} server part {} sent: {}", slot, i + 1, command),
                        Severity::Success,
                        SOURCE_PUSH,
                    );
                }
                Err(e) => {
                    self.events.add_log(
                        &format!("{} server part {} not sent: {} ({})", slot, i + 1, command, e),
                        Severity::Error,
                        SOURCE_PUSH,
                    );
                }
            }
        }

        match delivered {
            d if d == total => Ok(()),
            0 => Err(Error::PushFailed {
                slot: slot.to_string(),
            }),
            d => Err(Error::PartialPush {
                slot: slot.to_string(),
                delivered: d,
                total,
            }),
        }
    }

    /// Pushes the configured primary server and, if set, the secondary.
    /// Returns the first failure.
    pub fn push_servers(&mut self) -> Result<()> {
        let Some(primary) = self.push.primary_server.clone() else {
            self.events
                .add_log("No time server configured", Severity::Warn, SOURCE_PUSH);
            return Err(Error::config("no primary time server configured"));
        };

        let mut outcome = self.push_config(&primary, ServerSlot::Primary);
        if let Some(secondary) = self.push.secondary_server.clone() {
            self.clock.sleep(self.push.inter_command_delay);
            let second = self.push_config(&secondary, ServerSlot::Secondary);
            outcome = outcome.and(second);
        }

        match &outcome {
            Ok(()) => self.events.add_log(
                "All time server settings delivered",
                Severity::Success,
                SOURCE_PUSH,
            ),
            Err(_) => self.events.add_log(
                "Time server settings partially delivered",
                Severity::Warn,
                SOURCE_PUSH,
            ),
        }
        outcome
    }

    /// Asks the peer how many fault records it holds
    pub fn fault_count(&mut self) -> Result<u32> {
        let command = fault::fault_count_command()?;
        let frame = match self.transport.exchange(&command, fault::FAULT_COUNT_TIMEOUT) {
            Ok(frame) => frame,
            Err(e) => {
                self.events.add_log(
                    &format!("Fault count query failed: {}", e),
                    Severity::Error,
                    SOURCE_LINK,
                );
                return Err(e);
            }
        };
        fault::parse_fault_count(frame.as_str()).map_err(|e| {
            self.transport.record_malformed();
            self.events.add_log(
                &format!("Unexpected fault count reply: '{}'", frame),
                Severity::Error,
                SOURCE_LINK,
            );
            e
        })
    }

    /// Fetches fault record `index` (1-based). Every reply, including the
    /// empty-slot marker, becomes the last fault response.
    pub fn request_fault(&mut self, index: u32) -> Result<ResponseFrame> {
        let command = fault::fault_record_command(index)?;
        let frame = match self.transport.exchange(&command, fault::FAULT_RECORD_TIMEOUT) {
            Ok(frame) => frame,
            Err(e) => {
                self.events.add_log(
                    &format!("Fault record {} not received: {}", index, e),
                    Severity::Error,
                    SOURCE_LINK,
                );
                return Err(e);
            }
        };
        self.last_fault = Some(frame.clone());
        if !fault::is_fault_record(frame.as_str()) {
            self.transport.record_malformed();
            self.events.add_log(
                &format!("No fault record at index {}", index),
                Severity::Error,
                SOURCE_LINK,
            );
            return Err(Error::malformed(format!("no fault record at index {}", index)));
        }
        Ok(frame)
    }

    /// Raw reply of the last fault record request
    pub fn last_fault_response(&self) -> Option<&ResponseFrame> {
        self.last_fault.as_ref()
    }

    /// Asks the peer to switch its link rate. The local port is left alone.
    /// A reply without an explicit ack is accepted with a warning.
    pub fn change_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let command = match fault::baud_rate_command(baud_rate) {
            Ok(command) => command,
            Err(e) => {
                self.events.add_log(
                    &format!("Unsupported baud rate {}", baud_rate),
                    Severity::Error,
                    SOURCE_LINK,
                );
                return Err(e);
            }
        };
        let frame = match self.transport.exchange(&command, fault::BAUD_RATE_TIMEOUT) {
            Ok(frame) => frame,
            Err(e) => {
                self.events.add_log(
                    &format!("Baud rate change to {} not answered: {}", baud_rate, e),
                    Severity::Error,
                    SOURCE_LINK,
                );
                return Err(e);
            }
        };
        if !fault::is_explicit_ack(frame.as_str()) {
            self.events.add_log(
                &format!("Baud rate change reply without ack: '{}'", frame),
                Severity::Warn,
                SOURCE_LINK,
            );
        }
        self.events.add_log(
            &format!("Peer baud rate set to {}", baud_rate),
            Severity::Success,
            SOURCE_LINK,
        );
        Ok(())
    }

    /// Forces a link reset
    pub fn reset_link(&mut self) {
        self.transport.reset();
    }

    /// Link transmission counters
    pub fn statistics(&self) -> Statistics {
        self.transport.statistics()
    }

    /// Link health as last observed
    pub fn health(&self) -> HealthState {
        self.transport.health()
    }

    /// Time synchronization state
    pub fn current_sync_state(&self) -> SyncState {
        self.sync.state()
    }

    /// Human readable synchronization summary
    pub fn format_sync_stats(&self) -> String {
        self.sync.format_stats(self.clock.now())
    }

    /// Human readable link status
    pub fn format_link_status(&self) -> String {
        self.transport.format_status()
    }

    /// `dd.mm.yyyy hh:mm:ss` when synchronized, uptime otherwise
    pub fn current_date_time(&self) -> String {
        self.sync.current_date_time(self.clock.now())
    }

    /// One cooperative iteration: health check, then staleness and a due
    /// sync attempt. Blocks for at most the exchanges it runs.
    pub fn poll(&mut self) -> PollReport {
        let health = self.transport.run_health_check();
        let sync = self.sync.tick(&mut self.transport);
        PollReport { health, sync }
    }

    /// Runs [`poll`](Self::poll) every control tick until `shutdown` turns
    /// true or its sender is dropped
    ///
    /// Exchanges block on the link, so on a multi-threaded runtime each poll
    /// runs under [`tokio::task::block_in_place`]. A current-thread runtime
    /// has no other worker to hand tasks to and polls inline.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.control_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(link = %self.transport.describe(), "control loop started");
        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = match Handle::current().runtime_flavor() {
                        RuntimeFlavor::MultiThread => task::block_in_place(|| self.poll()),
                        _ => self.poll(),
                    };
                    if report != PollReport::default() {
                        debug!(?report, "control tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("control loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemorySink;
    use crate::link::{ScriptedLink, ScriptedPeer};
    use crate::time::ManualClock;

    fn controller(config: Config) -> (Controller, ScriptedPeer, ManualClock, MemorySink) {
        let (link, peer) = ScriptedLink::new();
        let clock = ManualClock::new();
        let sink = MemorySink::default();
        let controller = Controller::new(
            config,
            Box::new(link),
            Arc::new(clock.clone()),
            Arc::new(sink.clone()),
        )
        .unwrap();
        (controller, peer, clock, sink)
    }

    #[test]
    fn test_push_primary() {
        let (mut controller, peer, _, sink) = controller(Config::default());
        peer.reply("OK\n").reply("OK\n");

        controller
            .push_config("192.168.1.2", ServerSlot::Primary)
            .unwrap();
        assert_eq!(peer.written(), vec!["192168u", "001002y"]);
        assert_eq!(sink.count(Severity::Success, SOURCE_PUSH), 2);
    }

    #[test]
    fn test_push_invalid_address() {
        let (mut controller, peer, _, _) = controller(Config::default());
        let err = controller
            .push_config("192.168.1", ServerSlot::Secondary)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert!(peer.written().is_empty());
    }

    #[test]
    fn test_push_failed_entirely() {
        let (mut controller, peer, _, _) = controller(Config::default());
        peer.silence().silence();
        let err = controller
            .push_config("10.0.0.1", ServerSlot::Secondary)
            .unwrap_err();
        assert!(matches!(err, Error::PushFailed { .. }));
        assert_eq!(peer.written(), vec!["010000w", "000001x"]);
    }

    #[test]
    fn test_push_servers_requires_primary() {
        let (mut controller, _, _, sink) = controller(Config::default());
        assert!(matches!(controller.push_servers(), Err(Error::Config(_))));
        assert_eq!(sink.count(Severity::Warn, SOURCE_PUSH), 1);
    }

    #[test]
    fn test_push_servers_both_slots() {
        let mut config = Config::default();
        config.push.primary_server = Some("192.168.1.2".to_string());
        config.push.secondary_server = Some("10.0.0.1".to_string());
        let (mut controller, peer, _, sink) = controller(config);
        for _ in 0..4 {
            peer.reply("OK\n");
        }

        controller.push_servers().unwrap();
        assert_eq!(
            peer.written(),
            vec!["192168u", "001002y", "010000w", "000001x"]
        );
        let last = sink.events().pop().unwrap();
        assert_eq!(last.severity, Severity::Success);
    }

    #[test]
    fn test_fault_count() {
        let (mut controller, peer, _, _) = controller(Config::default());
        peer.reply("A50\n").reply("garbage\n");

        assert_eq!(controller.fault_count().unwrap(), 49);
        assert!(matches!(
            controller.fault_count(),
            Err(Error::MalformedResponse(_))
        ));
        assert_eq!(controller.statistics().frame_errors, 1);
    }

    #[test]
    fn test_fault_record() {
        let (mut controller, peer, _, sink) = controller(Config::default());
        peer.reply("P1;OVERVOLT;010125\n").reply("E\n");

        let record = controller.request_fault(1).unwrap();
        assert_eq!(record.as_str(), "P1;OVERVOLT;010125");
        assert_eq!(controller.statistics().frame_errors, 0);

        assert!(matches!(
            controller.request_fault(2),
            Err(Error::MalformedResponse(_))
        ));
        assert_eq!(controller.statistics().frame_errors, 1);
        assert!(controller.statistics().success_rate < 100.0);
        assert_eq!(
            controller.last_fault_response().map(|f| f.as_str()),
            Some("E")
        );
        assert_eq!(sink.count(Severity::Error, SOURCE_LINK), 1);
        assert_eq!(peer.written(), vec!["00001v", "00002v"]);
    }

    #[test]
    fn test_fault_queries_use_their_own_timeouts() {
        let (mut controller, peer, clock, sink) = controller(Config::default());
        peer.silence().silence().silence();

        let before = clock.elapsed();
        assert!(matches!(
            controller.fault_count(),
            Err(Error::Timeout(t)) if t == fault::FAULT_COUNT_TIMEOUT
        ));
        let spent = clock.elapsed() - before;
        assert!(spent >= fault::FAULT_COUNT_TIMEOUT && spent < fault::FAULT_RECORD_TIMEOUT);

        assert!(matches!(
            controller.request_fault(7),
            Err(Error::Timeout(t)) if t == fault::FAULT_RECORD_TIMEOUT
        ));
        assert!(matches!(
            controller.change_baud_rate(9600),
            Err(Error::Timeout(t)) if t == fault::BAUD_RATE_TIMEOUT
        ));
        assert_eq!(sink.count(Severity::Error, SOURCE_LINK), 3);
    }

    #[test]
    fn test_run_exits_when_sender_dropped() {
        let (mut controller, _, _, _) = controller(Config::default());
        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio_test::block_on(controller.run(rx)).unwrap();
    }

    #[test]
    fn test_change_baud_rate() {
        let (mut controller, peer, _, sink) = controller(Config::default());
        peer.reply("ACK\n").reply("READY\n");
        controller.change_baud_rate(115_200).unwrap();
        assert_eq!(sink.count(Severity::Warn, SOURCE_LINK), 0);

        controller.change_baud_rate(9600).unwrap();
        let warning = sink
            .events()
            .into_iter()
            .find(|e| e.severity == Severity::Warn)
            .unwrap();
        assert!(warning.message.contains("READY"));

        assert!(controller.change_baud_rate(250_000).is_err());
        assert_eq!(sink.count(Severity::Error, SOURCE_LINK), 1);
        assert_eq!(peer.written(), vec!["4Br", "0Br"]);
    }
}
