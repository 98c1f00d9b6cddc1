// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wsrm::config::URI_ANONYMOUS;
use wsrm::{
    AckRange, Error, ManualClock, MemoryTransport, RetryPolicyKind, RmConfig, RmEngine,
    SendRequest,
};

const SERVER: &str = "http://server/rm";
const THRESHOLD_MS: u64 = 20_000;

struct Harness {
    engine: RmEngine,
    transport: Arc<MemoryTransport>,
    clock: ManualClock,
}

/// Engine on a manual clock whose background retry loop never fires on its
/// own; tests drive scans with `scan_once`.
fn harness(config: RmConfig) -> Harness {
    let transport = Arc::new(MemoryTransport::new());
    let clock = ManualClock::new(1_000_000);
    let config = config.with_retry_scan_period(Duration::from_secs(3_600));
    let engine =
        RmEngine::with_clock(transport.clone(), config, Arc::new(clock.clone())).expect("engine");
    Harness {
        engine,
        transport,
        clock,
    }
}

fn send_n(h: &Harness, id: &str, n: usize) {
    for _ in 0..n {
        h.engine
            .send(SendRequest::new(id, SERVER, URI_ANONYMOUS))
            .expect("send");
    }
}

fn sends_of(h: &Harness, msg_num: u64) -> usize {
    h.transport
        .sent_to(SERVER)
        .iter()
        .filter(|e| e.sequence().and_then(|s| s.message_number) == Some(msg_num))
        .count()
}

fn in_flight(h: &Harness, id: &str) -> Vec<u64> {
    h.engine
        .store()
        .outbound(id)
        .map(|s| s.lock().in_flight_numbers())
        .unwrap_or_default()
}

#[test]
fn test_scenario_c_range_acks_drain_in_flight() {
    let h = harness(RmConfig::default());
    send_n(&h, "s", 3);
    assert_eq!(in_flight(&h, "s"), vec![1, 2, 3]);

    assert_eq!(h.engine.apply_ack("s", &[AckRange::new(1, 2)]).expect("ack"), 2);
    assert_eq!(in_flight(&h, "s"), vec![3]);

    assert_eq!(h.engine.apply_ack("s", &[AckRange::new(1, 3)]).expect("ack"), 1);
    assert!(in_flight(&h, "s").is_empty());
}

#[test]
fn test_receiver_ranges_leave_exactly_undelivered_in_flight() {
    let mut rng = fastrand::Rng::with_seed(0x5eed_0101);

    for round in 0..100 {
        let sender = harness(RmConfig::default());
        let receiver = harness(RmConfig::default());
        let id = format!("s-{}", round);

        let mut sent = Vec::new();
        for _ in 0..rng.usize(1..=40) {
            let request =
                SendRequest::new(&id, SERVER, "http://client/rm").with_skip(rng.u8(..) < 40);
            sent.push(sender.engine.send(request).expect("send").message_number());
        }
        assert_eq!(in_flight(&sender, &id), sent);

        let mut delivered: Vec<u64> = sent.iter().copied().filter(|_| rng.bool()).collect();
        rng.shuffle(&mut delivered);
        for &n in &delivered {
            receiver.engine.record_arrival(&id, n, Some("http://client/rm"));
        }

        let expected: Vec<u64> = sent
            .iter()
            .copied()
            .filter(|n| !delivered.contains(n))
            .collect();
        let ranges = receiver.engine.ack_ranges(&id).unwrap_or_default();
        let removed = sender.engine.apply_ack(&id, &ranges).expect("ack");
        assert_eq!(removed, delivered.len());
        assert_eq!(in_flight(&sender, &id), expected, "round {}", round);
    }
}

#[test]
fn test_scenario_e_unknown_sequence() {
    let h = harness(RmConfig::default());
    let err = h
        .engine
        .apply_ack("urn:identifier-never", &[AckRange::new(1, 1)])
        .unwrap_err();
    assert!(matches!(err, Error::UnknownSequence(_)));
    assert_eq!(err.fault_code(), Some("WSRM.UnknownSequence"));
    assert!(h.engine.store().outbound("urn:identifier-never").is_none());
}

#[test]
fn test_scenario_d_one_resend_per_threshold_interval() {
    let h = harness(RmConfig::default());
    send_n(&h, "s", 1);
    assert_eq!(sends_of(&h, 1), 1);

    h.clock.advance_ms(THRESHOLD_MS);
    assert_eq!(h.engine.retry().scan_once().resent, 0);

    h.clock.advance_ms(1);
    assert_eq!(h.engine.retry().scan_once().resent, 1);
    // Several scans inside one interval do not resend again.
    for _ in 0..5 {
        h.clock.advance_ms(3_000);
        h.engine.retry().scan_once();
    }
    assert_eq!(sends_of(&h, 1), 2);

    h.clock.advance_ms(THRESHOLD_MS);
    h.engine.retry().scan_once();
    assert_eq!(sends_of(&h, 1), 3);

    h.engine
        .apply_ack("s", &[AckRange::new(1, 1)])
        .expect("ack");
    h.clock.advance_ms(10 * THRESHOLD_MS);
    assert_eq!(h.engine.retry().scan_once().resent, 0);
    assert_eq!(sends_of(&h, 1), 3);
}

#[test]
fn test_scenario_d_ack_races_retry_scan() {
    for _ in 0..20 {
        let h = Arc::new(harness(RmConfig::default()));
        send_n(&h, "s", 4);

        let stop = Arc::new(AtomicBool::new(false));
        let hammer = {
            let h = Arc::clone(&h);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    h.clock.advance_ms(THRESHOLD_MS + 1);
                    h.engine.retry().scan_once();
                }
            })
        };

        thread::sleep(Duration::from_millis(2));
        h.engine
            .apply_ack("s", &[AckRange::new(1, 2)])
            .expect("ack");
        let at_ack = (sends_of(&h, 1), sends_of(&h, 2));

        // Keep the retry scans going for a while after the ack.
        thread::sleep(Duration::from_millis(10));
        stop.store(true, Ordering::Release);
        hammer.join().expect("hammer thread");

        assert_eq!((sends_of(&h, 1), sends_of(&h, 2)), at_ack);
        assert!(sends_of(&h, 3) >= at_ack.0, "unacked messages keep being resent");
        assert_eq!(in_flight(&h, "s"), vec![3, 4]);
    }
}

#[test]
fn test_failed_first_send_is_covered_by_retry() {
    let h = harness(RmConfig::default());
    h.transport.set_failing(true);
    let out = h
        .engine
        .send(SendRequest::new("s", SERVER, URI_ANONYMOUS))
        .expect("send");
    assert!(!out.transmitted);
    assert_eq!(sends_of(&h, 1), 0);

    h.transport.set_failing(false);
    h.clock.advance_ms(THRESHOLD_MS + 1);
    assert_eq!(h.engine.retry().scan_once().resent, 1);
    assert_eq!(sends_of(&h, 1), 1);
    assert_eq!(h.engine.metrics().send_failures, 1);
}

#[test]
fn test_exponential_policy_gives_up() {
    let config = RmConfig::default()
        .with_retry_threshold(Duration::from_secs(1))
        .with_retry_policy(RetryPolicyKind::Exponential {
            max_threshold: Duration::from_secs(4),
            max_attempts: 2,
        });
    let h = harness(config);
    send_n(&h, "s", 1);

    h.clock.advance_ms(1_001);
    assert_eq!(h.engine.retry().scan_once().resent, 1);
    h.clock.advance_ms(2_001);
    assert_eq!(h.engine.retry().scan_once().resent, 1);
    h.clock.advance_ms(4_001);
    let report = h.engine.retry().scan_once();
    assert_eq!(report.resent, 0);
    assert_eq!(report.abandoned, 1);

    assert!(in_flight(&h, "s").is_empty());
    assert_eq!(h.engine.retry().abandoned(), 1);
    assert_eq!(h.engine.metrics().messages_abandoned, 1);
    assert_eq!(sends_of(&h, 1), 3);
}

#[test]
fn test_last_message_completion() {
    let h = harness(RmConfig::default());
    send_n(&h, "s", 2);
    h.engine
        .send(SendRequest::new("s", SERVER, URI_ANONYMOUS).with_last_message(true))
        .expect("send");
    assert!(!h.engine.is_outbound_complete("s"));

    h.engine
        .apply_ack("s", &[AckRange::new(1, 3)])
        .expect("ack");
    assert!(h.engine.is_outbound_complete("s"));

    send_n(&h, "other", 1);
    assert_eq!(h.engine.evict_completed(), (0, 1));
    assert!(h.engine.store().outbound("s").is_none());
    assert_eq!(h.engine.store().outbound_len(), 1);
}
