// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retransmission of unacknowledged messages.
//!
//! A single background loop wakes up every scan period and walks every
//! outbound sequence. Each sequence is locked for the whole decide-and-resend
//! step, so an ack applied concurrently either removes a record before the
//! scan sees it or waits until the scan is done with the sequence.
//!
//! Whether a record is resent is decided by a [`RetryPolicy`]:
//!
//! | Policy               | Threshold                          | Cap                 |
//! |----------------------|------------------------------------|---------------------|
//! | [`FixedInterval`]    | constant                           | none                |
//! | [`ExponentialBackoff`] | `base * 2^retransmissions`, capped | give up after N     |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::clock::TimeSource;
use crate::config::{RetryPolicyKind, RmConfig};
use crate::metrics::RmMetrics;
use crate::sequence::{MessageRecord, SequenceStore};
use crate::transport::Transport;

/// What to do with one in-flight record on this scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Not stale yet.
    Wait,
    /// Resend now and refresh the timestamp.
    Resend,
    /// Drop the record without resending.
    GiveUp,
}

/// Retransmission strategy.
pub trait RetryPolicy: Send + Sync {
    fn decide(&self, record: &MessageRecord, now_ms: u64) -> RetryDecision;
}

/// Resend whenever the record is older than a fixed threshold. Never gives up.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    threshold_ms: u64,
}

impl FixedInterval {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold_ms: threshold.as_millis() as u64,
        }
    }
}

impl RetryPolicy for FixedInterval {
    fn decide(&self, record: &MessageRecord, now_ms: u64) -> RetryDecision {
        if record.age_ms(now_ms) > self.threshold_ms {
            RetryDecision::Resend
        } else {
            RetryDecision::Wait
        }
    }
}

/// Threshold doubles after every retransmission up to a ceiling; the record
/// is dropped once `max_attempts` retransmissions went unacknowledged.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            max_attempts,
        }
    }

    /// Threshold in effect after `retransmissions` resends.
    pub fn threshold_ms(&self, retransmissions: u32) -> u64 {
        let factor = 1u64.checked_shl(retransmissions.min(63)).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn decide(&self, record: &MessageRecord, now_ms: u64) -> RetryDecision {
        if record.age_ms(now_ms) <= self.threshold_ms(record.retransmissions) {
            return RetryDecision::Wait;
        }
        if record.retransmissions >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Resend
        }
    }
}

/// Build the policy selected by `config`.
pub fn policy_from_config(config: &RmConfig) -> Box<dyn RetryPolicy> {
    match config.retry_policy {
        RetryPolicyKind::Fixed => Box::new(FixedInterval::new(config.retry_threshold)),
        RetryPolicyKind::Exponential {
            max_threshold,
            max_attempts,
        } => Box::new(ExponentialBackoff::new(
            config.retry_threshold,
            max_threshold,
            max_attempts,
        )),
    }
}

/// Result of one scan over all outbound sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub resent: usize,
    pub failed: usize,
    pub abandoned: usize,
}

struct RetryCore {
    store: Arc<SequenceStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn TimeSource>,
    policy: Box<dyn RetryPolicy>,
    metrics: Arc<RmMetrics>,
}

impl RetryCore {
    fn scan_once(&self) -> ScanReport {
        let mut report = ScanReport::default();

        for entry in self.store.outbound_snapshot() {
            let mut seq = entry.lock();
            let destination = seq.destination().to_string();
            let now = self.clock.now_ms();
            let mut give_up = Vec::new();

            for record in seq.in_flight_mut() {
                match self.policy.decide(record, now) {
                    RetryDecision::Wait => {}
                    RetryDecision::Resend => {
                        match self.transport.send_one_way(&record.payload, &destination) {
                            Ok(()) => {
                                record.mark_resent(now);
                                report.resent += 1;
                                log::debug!(
                                    "[retry] resent {} #{} to {} (attempt {})",
                                    entry_id(&record.payload),
                                    record.seq_num,
                                    destination,
                                    record.retransmissions
                                );
                            }
                            Err(e) => {
                                report.failed += 1;
                                self.metrics.increment_send_failures();
                                log::warn!(
                                    "[retry] resend of #{} to {} failed: {}",
                                    record.seq_num,
                                    destination,
                                    e
                                );
                            }
                        }
                    }
                    RetryDecision::GiveUp => give_up.push(record.seq_num),
                }
            }

            for n in give_up {
                if seq.remove(n).is_some() {
                    report.abandoned += 1;
                    log::warn!(
                        "[retry] {}: giving up on #{} to {}",
                        seq.id(),
                        n,
                        destination
                    );
                }
            }
        }

        self.metrics.increment_retransmissions(report.resent as u64);
        self.metrics.increment_abandoned(report.abandoned as u64);
        report
    }
}

fn entry_id(payload: &crate::envelope::Envelope) -> &str {
    payload
        .sequence()
        .and_then(|s| s.identifier.as_deref())
        .unwrap_or("?")
}

/// Background loop handle plus its stop channel.
///
/// Dropping the sender disconnects the channel, which wakes the loop out of
/// `recv_timeout` immediately.
struct StopHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StopHandle {
    fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Periodic retransmission service.
///
/// The loop is started lazily by the first outbound send
/// ([`RetryEngine::ensure_running`]); at most one loop exists at a time.
pub struct RetryEngine {
    core: Arc<RetryCore>,
    scan_period: Duration,
    stop_handle: Mutex<Option<StopHandle>>,
    shut_down: AtomicBool,
}

impl RetryEngine {
    pub(crate) fn new(
        store: Arc<SequenceStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn TimeSource>,
        policy: Box<dyn RetryPolicy>,
        metrics: Arc<RmMetrics>,
        scan_period: Duration,
    ) -> Self {
        Self {
            core: Arc::new(RetryCore {
                store,
                transport,
                clock,
                policy,
                metrics,
            }),
            scan_period,
            stop_handle: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Run one scan on the calling thread.
    pub fn scan_once(&self) -> ScanReport {
        self.core.scan_once()
    }

    /// Start the loop unless it is already running. Returns true if this
    /// call started it; never restarts after [`RetryEngine::stop`].
    pub fn ensure_running(&self) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }
        let mut slot = self.stop_handle.lock();
        if slot.is_some() {
            return false;
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let core = Arc::clone(&self.core);
        let period = self.scan_period;

        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let thread = thread::Builder::new()
            .name("wsrm-retry".into())
            .spawn(move || {
                log::debug!("[retry] loop started (period={:?})", period);
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            let report = core.scan_once();
                            if report != ScanReport::default() {
                                log::trace!("[retry] scan: {:?}", report);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("[retry] loop stopped");
            })
            .expect("failed to spawn retry thread");

        *slot = Some(StopHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        });
        true
    }

    pub fn is_running(&self) -> bool {
        self.stop_handle.lock().is_some()
    }

    /// Stop the loop and wait for it. In-flight records are kept.
    pub fn stop(&self) {
        self.shut_down.store(true, Ordering::Release);
        let handle = self.stop_handle.lock().take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
    }

    /// Records dropped by the retry policy so far.
    pub fn abandoned(&self) -> u64 {
        self.core.metrics.messages_abandoned()
    }
}

impl Drop for RetryEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine")
            .field("scan_period", &self.scan_period)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::envelope::{Envelope, Header, SequenceHeader};
    use crate::sequence::AckRange;
    use crate::transport::MemoryTransport;

    const DEST: &str = "http://server";

    struct Fixture {
        store: Arc<SequenceStore>,
        transport: Arc<MemoryTransport>,
        clock: ManualClock,
        engine: RetryEngine,
    }

    fn fixture(policy: Box<dyn RetryPolicy>) -> Fixture {
        let store = Arc::new(SequenceStore::new());
        let transport = Arc::new(MemoryTransport::new());
        let clock = ManualClock::new(0);
        let engine = RetryEngine::new(
            Arc::clone(&store),
            transport.clone(),
            Arc::new(clock.clone()),
            policy,
            Arc::new(RmMetrics::new()),
            Duration::from_secs(3),
        );
        Fixture {
            store,
            transport,
            clock,
            engine,
        }
    }

    fn send(f: &Fixture, count: u64) {
        let seq = f.store.outbound_or_insert("s", DEST);
        let mut seq = seq.lock();
        for _ in 0..count {
            let n = seq.allocate(false);
            let env = Envelope::new().with_header(Header::Sequence(SequenceHeader::new("s", n)));
            seq.record(MessageRecord::new(n, f.clock.now_ms(), env));
        }
    }

    #[test]
    fn test_fixed_threshold_is_strict() {
        let p = FixedInterval::new(Duration::from_secs(20));
        let rec = MessageRecord::new(1, 0, Envelope::new());
        assert_eq!(p.decide(&rec, 20_000), RetryDecision::Wait);
        assert_eq!(p.decide(&rec, 20_001), RetryDecision::Resend);
    }

    #[test]
    fn test_exponential_threshold_doubles_and_caps() {
        let p = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5), 3);
        assert_eq!(p.threshold_ms(0), 1_000);
        assert_eq!(p.threshold_ms(1), 2_000);
        assert_eq!(p.threshold_ms(2), 4_000);
        assert_eq!(p.threshold_ms(3), 5_000);
        assert_eq!(p.threshold_ms(200), 5_000);
    }

    #[test]
    fn test_exponential_gives_up_after_max_attempts() {
        let p = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5), 1);
        let mut rec = MessageRecord::new(1, 0, Envelope::new());
        assert_eq!(p.decide(&rec, 1_001), RetryDecision::Resend);
        rec.mark_resent(1_001);
        assert_eq!(p.decide(&rec, 2_000), RetryDecision::Wait);
        assert_eq!(p.decide(&rec, 3_002), RetryDecision::GiveUp);
    }

    #[test]
    fn test_scan_resends_only_stale_records() {
        let f = fixture(Box::new(FixedInterval::new(Duration::from_secs(20))));
        send(&f, 2);
        f.clock.advance_ms(10_000);
        send(&f, 1);

        f.clock.advance_ms(10_001);
        let report = f.engine.scan_once();
        assert_eq!(report.resent, 2);
        assert_eq!(f.transport.len(), 2);

        // Refreshed timestamps: nothing is stale right after a resend.
        assert_eq!(f.engine.scan_once().resent, 0);
    }

    #[test]
    fn test_failed_resend_stays_eligible() {
        let f = fixture(Box::new(FixedInterval::new(Duration::from_secs(20))));
        send(&f, 1);
        f.clock.advance_ms(20_001);

        f.transport.set_failing(true);
        let report = f.engine.scan_once();
        assert_eq!(report.failed, 1);
        assert_eq!(report.resent, 0);

        f.transport.set_failing(false);
        assert_eq!(f.engine.scan_once().resent, 1);
    }

    #[test]
    fn test_acked_records_are_not_resent() {
        let f = fixture(Box::new(FixedInterval::new(Duration::from_secs(20))));
        send(&f, 3);
        f.store
            .outbound("s")
            .expect("s")
            .lock()
            .acknowledge(AckRange::new(1, 2));
        f.clock.advance_ms(20_001);

        assert_eq!(f.engine.scan_once().resent, 1);
        let sent = f.transport.sent_to(DEST);
        assert_eq!(sent[0].sequence().and_then(|s| s.message_number), Some(3));
    }

    #[test]
    fn test_give_up_removes_record() {
        let f = fixture(Box::new(ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            0,
        )));
        send(&f, 1);
        f.clock.advance_ms(1_001);
        let report = f.engine.scan_once();
        assert_eq!(report.abandoned, 1);
        assert_eq!(f.engine.abandoned(), 1);
        assert_eq!(f.store.in_flight_total(), 0);
        assert!(f.transport.is_empty());
    }

    #[test]
    fn test_ensure_running_is_idempotent() {
        let f = fixture(Box::new(FixedInterval::new(Duration::from_secs(20))));
        assert!(f.engine.ensure_running());
        assert!(!f.engine.ensure_running());
        assert!(f.engine.is_running());

        f.engine.stop();
        assert!(!f.engine.is_running());
        assert!(!f.engine.ensure_running());
    }
}
