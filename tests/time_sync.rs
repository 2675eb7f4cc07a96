use std::sync::Arc;
use std::time::Duration;

use fieldlink::core::{Config, MemorySink};
use fieldlink::link::{ScriptedLink, ScriptedPeer};
use fieldlink::sync::{SyncOutcome, SyncPhase, TimeSync};
use fieldlink::time::{Clock, ManualClock};
use fieldlink::transport::TransportChannel;

const STEP: Duration = Duration::from_millis(100);

fn setup() -> (TimeSync, TransportChannel, ScriptedPeer, ManualClock) {
    let (link, peer) = ScriptedLink::new();
    let clock = ManualClock::new();
    let sink = Arc::new(MemorySink::default());
    let config = Config::default();
    let transport =
        TransportChannel::new(Box::new(link), &config, Arc::new(clock.clone()), sink.clone())
            .unwrap();
    let sync = TimeSync::new(config.sync, clock.now(), sink).unwrap();
    (sync, transport, peer, clock)
}

/// Ticks until the next attempt runs; returns its start and outcome
fn next_attempt(
    sync: &mut TimeSync,
    transport: &mut TransportChannel,
    clock: &ManualClock,
) -> (Duration, SyncOutcome) {
    for _ in 0..100_000 {
        let start = clock.elapsed();
        if let Some(outcome) = sync.tick(transport) {
            return (start, outcome);
        }
        clock.advance(STEP);
    }
    panic!("no attempt within the search window");
}

#[test]
fn backoff_then_refresh_cadence() {
    let (mut sync, mut transport, peer, clock) = setup();
    for _ in 0..6 {
        peer.silence();
    }
    peer.reply("DATE:150325,TIME:081500\n");

    let mut starts = Vec::new();
    for _ in 0..6 {
        let (start, outcome) = next_attempt(&mut sync, &mut transport, &clock);
        assert_eq!(outcome, SyncOutcome::Failed);
        starts.push(start);
    }
    // First attempt runs at once
    assert_eq!(starts[0], Duration::ZERO);
    for pair in starts[..5].windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap > Duration::from_secs(5) && gap <= Duration::from_millis(5_200));
    }
    let gap = starts[5] - starts[4];
    assert!(gap > Duration::from_secs(30) && gap <= Duration::from_millis(30_200));
    assert_eq!(sync.scheduler().phase(), SyncPhase::SlowRetry);

    let (synced_at, outcome) = next_attempt(&mut sync, &mut transport, &clock);
    assert_eq!(outcome, SyncOutcome::Synced);
    assert!(synced_at - starts[5] > Duration::from_secs(30));
    assert!(sync.state().is_valid);
    assert_eq!(sync.state().consecutive_failures, 0);
    assert_eq!(sync.scheduler().interval(), Duration::from_secs(300));

    // Refresh fails, but validity holds while the window is open
    let (refresh_at, outcome) = next_attempt(&mut sync, &mut transport, &clock);
    assert_eq!(outcome, SyncOutcome::Failed);
    let gap = refresh_at - synced_at;
    assert!(gap > Duration::from_secs(300) && gap <= Duration::from_millis(300_200));
    assert!(sync.state().is_valid);
    assert_eq!(sync.scheduler().phase(), SyncPhase::Synced);
}

#[test]
fn validity_is_revoked_after_staleness_window() {
    let (mut sync, mut transport, peer, clock) = setup();
    peer.reply("150325081500\n");
    let (_, outcome) = next_attempt(&mut sync, &mut transport, &clock);
    assert_eq!(outcome, SyncOutcome::Synced);
    let last_success = sync.state().last_success.unwrap();

    // The peer goes quiet for good
    loop {
        let _ = sync.tick(&mut transport);
        let age = clock.now() - last_success;
        if age <= Duration::from_secs(600) {
            assert!(sync.state().is_valid, "revoked early at {:?}", age);
        } else if !sync.state().is_valid {
            assert!(age <= Duration::from_secs(603));
            break;
        }
        clock.advance(STEP);
    }
    assert_ne!(sync.scheduler().phase(), SyncPhase::Synced);
    // The values are kept for display
    assert!(sync.state().last_date.is_some());
    assert!(sync.format_stats(clock.now()).contains("inactive"));
}

#[test]
fn single_field_frames_complete_on_time() {
    let (mut sync, mut transport, peer, clock) = setup();
    peer.reply("010125A").reply("235959a");

    let (_, outcome) = next_attempt(&mut sync, &mut transport, &clock);
    assert_eq!(outcome, SyncOutcome::Partial);
    // A partial reading neither succeeds nor counts as failure
    assert_eq!(sync.state().consecutive_failures, 0);
    assert_eq!(sync.scheduler().phase(), SyncPhase::FastRetry);

    let (_, outcome) = next_attempt(&mut sync, &mut transport, &clock);
    assert_eq!(outcome, SyncOutcome::Synced);
    assert_eq!(sync.current_date_time(clock.now()), "01.01.2025 23:59:59");
    let datetime = sync.state().datetime().unwrap();
    assert_eq!(datetime.to_string(), "2025-01-01 23:59:59");
}

#[test]
fn invalid_field_values_still_sync() {
    let (mut sync, mut transport, peer, clock) = setup();
    peer.reply("DATE:320125,TIME:246000\n");

    let (_, outcome) = next_attempt(&mut sync, &mut transport, &clock);
    assert_eq!(outcome, SyncOutcome::Synced);
    assert_eq!(sync.current_date_time(clock.now()), "invalid invalid");
    assert!(sync.state().datetime().is_none());
}
