// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deferred acknowledgement scheduler.
//!
//! One worker thread sends acks for sequences whose peer asked for them
//! out of band. Producers push identifiers over an unbounded channel and
//! return immediately; the coalescing delay is a deadline kept by the
//! worker, not a sleep on the caller's thread.
//!
//! ## Flow
//!
//! ```text
//! handler thread          channel           ack worker
//!   schedule_ack(id) ───▶ Schedule(id) ───▶ pending[id] = now + delay
//!                                             │ (already pending: coalesced)
//!                                             ▼
//!                                  recv_timeout(min(next due, tick))
//!                                             │
//!                                  take_due(now) -> [id, ...]
//!                                             │
//!                                  ranges from current state, send_one_way
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::ack::build_ack_envelope;
use crate::clock::TimeSource;
use crate::config::URI_ANONYMOUS;
use crate::ids::IdGenerator;
use crate::metrics::RmMetrics;
use crate::sequence::SequenceStore;
use crate::transport::Transport;
use crate::{Error, Result};

/// Commands consumed by the ack worker.
#[derive(Debug)]
enum AckCommand {
    Schedule(String),
    Shutdown,
}

/// Pending deferred acks keyed by sequence identifier.
///
/// Owned by the worker thread; the scheduler logic lives here so it can be
/// driven directly with explicit timestamps.
#[derive(Debug)]
pub struct AckQueue {
    delay_ms: u64,
    pending: HashMap<String, u64>,
}

impl AckQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            pending: HashMap::new(),
        }
    }

    /// Request an ack for `id`, due `delay` after `now_ms`.
    ///
    /// Returns false if one is already pending (coalesced; the original
    /// deadline is kept).
    pub fn schedule(&mut self, id: String, now_ms: u64) -> bool {
        if self.pending.contains_key(&id) {
            return false;
        }
        self.pending.insert(id, now_ms.saturating_add(self.delay_ms));
        true
    }

    /// Remove and return every identifier due at `now_ms`, earliest first.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<String> {
        let mut due: Vec<(u64, String)> = Vec::new();
        self.pending.retain(|id, at| {
            if *at <= now_ms {
                due.push((*at, id.clone()));
                false
            } else {
                true
            }
        });
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Earliest pending deadline.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.values().copied().min()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Everything the worker needs to turn an identifier into a sent ack.
#[derive(Clone)]
pub(crate) struct AckSender {
    pub store: Arc<SequenceStore>,
    pub transport: Arc<dyn Transport>,
    pub ids: Arc<IdGenerator>,
    pub metrics: Arc<RmMetrics>,
}

impl AckSender {
    /// Build the ack from the sequence's current state and send it to the
    /// sequence endpoint. Failures are logged, never retried.
    pub fn send_ack(&self, id: &str) -> bool {
        let Some(entry) = self.store.inbound(id) else {
            log::debug!("[ack-task] {}: sequence vanished, ack dropped", id);
            return false;
        };

        let (endpoint, envelope) = {
            let seq = entry.lock();
            match seq.endpoint() {
                Some(ep) if ep != URI_ANONYMOUS => {
                    (ep.to_string(), build_ack_envelope(&seq, &self.ids))
                }
                _ => {
                    log::debug!("[ack-task] {}: no reply endpoint, ack dropped", id);
                    return false;
                }
            }
        };

        match self.transport.send_one_way(&envelope, &endpoint) {
            Ok(()) => {
                self.metrics.increment_acks_sent_async();
                log::trace!("[ack-task] {}: ack sent to {}", id, endpoint);
                true
            }
            Err(e) => {
                self.metrics.increment_send_failures();
                log::warn!("[ack-task] {}: ack to {} failed: {}", id, endpoint, e);
                false
            }
        }
    }
}

/// Handle to the ack worker thread.
///
/// Dropping the handle shuts the worker down and joins it.
pub struct AckScheduler {
    sender: Sender<AckCommand>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AckScheduler {
    /// Spawn the ack worker.
    ///
    /// # Arguments
    /// - `delay`: coalescing delay before a scheduled ack is sent
    /// - `tick`: upper bound on how long the worker blocks before
    ///   re-reading `clock`
    pub(crate) fn spawn(
        acks: AckSender,
        clock: Arc<dyn TimeSource>,
        delay: Duration,
        tick: Duration,
    ) -> Self {
        let (sender, receiver) = channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let thread = thread::Builder::new()
            .name("wsrm-ack-task".into())
            .spawn(move || {
                ack_loop(receiver, acks, clock, AckQueue::new(delay), tick, running_clone);
            })
            .expect("failed to spawn ack worker thread");

        Self {
            sender,
            running,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Ask for an ack of sequence `id` to be sent out of band. Never blocks.
    ///
    /// # Errors
    /// `ShutDown` once the worker has been stopped.
    pub fn schedule_ack(&self, id: &str) -> Result<()> {
        if !self.is_running() {
            return Err(Error::ShutDown);
        }
        self.sender
            .send(AckCommand::Schedule(id.to_string()))
            .map_err(|_| Error::ShutDown)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it. Pending acks are discarded.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.sender.send(AckCommand::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AckScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AckScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Worker loop - runs until shutdown or channel disconnect.
fn ack_loop(
    receiver: Receiver<AckCommand>,
    acks: AckSender,
    clock: Arc<dyn TimeSource>,
    mut queue: AckQueue,
    tick: Duration,
    running: Arc<AtomicBool>,
) {
    log::debug!("[ack-task] worker started (tick={:?})", tick);

    while running.load(Ordering::Acquire) {
        let now = clock.now_ms();
        let wait = match queue.next_due() {
            Some(at) => tick.min(Duration::from_millis(at.saturating_sub(now))),
            None => tick,
        };

        match receiver.recv_timeout(wait) {
            Ok(AckCommand::Schedule(id)) => {
                let now = clock.now_ms();
                enqueue(&mut queue, id, now);
                // Drain whatever else is queued before sending.
                while let Ok(cmd) = receiver.try_recv() {
                    match cmd {
                        AckCommand::Schedule(id) => enqueue(&mut queue, id, now),
                        AckCommand::Shutdown => {
                            running.store(false, Ordering::Release);
                            break;
                        }
                    }
                }
            }
            Ok(AckCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if !running.load(Ordering::Acquire) {
            break;
        }

        for id in queue.take_due(clock.now_ms()) {
            acks.send_ack(&id);
        }
    }

    log::debug!(
        "[ack-task] worker stopped ({} pending ack(s) discarded)",
        queue.len()
    );
}

fn enqueue(queue: &mut AckQueue, id: String, now_ms: u64) {
    if queue.schedule(id.clone(), now_ms) {
        log::trace!("[ack-task] {}: ack scheduled", id);
    } else {
        log::trace!("[ack-task] {}: ack already pending", id);
    }
}
