// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RmEngine - owns the shared state and both background services.
//!
//! The message-handling layer talks to the engine at three points:
//!
//! - [`RmEngine::handle_inbound`] for requests carrying a `Sequence` header
//! - [`RmEngine::handle_ack`] for requests carrying acknowledgements
//! - [`RmEngine::send`] for outgoing application messages
//!
//! [`RmEngine::handle_incoming`] combines the first two for envelopes that
//! carry both a message and piggybacked acks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ack::stamp_ack;
use crate::applier::AckApplier;
use crate::clock::{SystemClock, TimeSource};
use crate::config::RmConfig;
use crate::envelope::{Envelope, HeaderKind};
use crate::ids::IdGenerator;
use crate::inbound::{AckDecision, InboundTracker};
use crate::metrics::{MetricsSnapshot, RmMetrics};
use crate::retry::{policy_from_config, RetryEngine};
use crate::scheduler::{AckScheduler, AckSender};
use crate::sequence::{AckRange, SequenceStore};
use crate::sequencer::{OutboundSequencer, SendOutcome, SendRequest};
use crate::transport::Transport;
use crate::{Error, Result};

/// Reliable-messaging engine.
///
/// # Lifecycle
///
/// The ack worker is spawned by [`RmEngine::start`] (or lazily by the first
/// deferred ack); the retry loop by the first [`RmEngine::send`].
/// [`RmEngine::shutdown`] stops both and is called on drop.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(MemoryTransport::new());
/// let engine = RmEngine::new(transport, RmConfig::default())?;
/// engine.start()?;
///
/// let id = engine.new_sequence_id();
/// engine.send(SendRequest::new(&id, "http://server/rm", URI_ANONYMOUS))?;
/// ```
pub struct RmEngine {
    config: RmConfig,
    store: Arc<SequenceStore>,
    clock: Arc<dyn TimeSource>,
    ids: Arc<IdGenerator>,
    metrics: Arc<RmMetrics>,
    tracker: InboundTracker,
    applier: AckApplier,
    retry: Arc<RetryEngine>,
    sequencer: OutboundSequencer,
    acks: AckSender,
    scheduler: Mutex<Option<AckScheduler>>,
    shut_down: AtomicBool,
}

impl RmEngine {
    /// Create an engine on the system clock.
    pub fn new(transport: Arc<dyn Transport>, config: RmConfig) -> Result<Self> {
        Self::with_clock(transport, config, Arc::new(SystemClock))
    }

    /// Create an engine on an explicit clock.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` does not validate.
    pub fn with_clock(
        transport: Arc<dyn Transport>,
        config: RmConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SequenceStore::new());
        let metrics = Arc::new(RmMetrics::new());
        let ids = Arc::new(IdGenerator::with_clock(Arc::clone(&clock)));

        let retry = Arc::new(RetryEngine::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&clock),
            policy_from_config(&config),
            Arc::clone(&metrics),
            config.retry_scan_period,
        ));
        let sequencer = OutboundSequencer::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&clock),
            Arc::clone(&ids),
            Arc::clone(&metrics),
            Arc::clone(&retry),
        );
        let acks = AckSender {
            store: Arc::clone(&store),
            transport,
            ids: Arc::clone(&ids),
            metrics: Arc::clone(&metrics),
        };

        log::debug!(
            "[engine] created (retry every {:?} after {:?}, ack delay {:?})",
            config.retry_scan_period,
            config.retry_threshold,
            config.ack_coalesce_delay
        );

        Ok(Self {
            tracker: InboundTracker::new(Arc::clone(&store), Arc::clone(&metrics)),
            applier: AckApplier::with_metrics(Arc::clone(&store), Arc::clone(&metrics)),
            config,
            store,
            clock,
            ids,
            metrics,
            retry,
            sequencer,
            acks,
            scheduler: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Spawn the ack worker. Idempotent.
    ///
    /// # Errors
    /// `ShutDown` after [`RmEngine::shutdown`].
    pub fn start(&self) -> Result<()> {
        self.ensure_open()?;
        let mut slot = self.scheduler.lock();
        if slot.is_none() {
            *slot = Some(AckScheduler::spawn(
                self.acks.clone(),
                Arc::clone(&self.clock),
                self.config.ack_coalesce_delay,
                self.config.ack_worker_tick,
            ));
        }
        Ok(())
    }

    /// Stop the ack worker and the retry loop. Idempotent.
    ///
    /// Sequence state is kept; pending deferred acks are discarded.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown();
        }
        self.retry.stop();
        log::debug!("[engine] shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(Error::ShutDown)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Receiver side
    // ========================================================================

    /// Record one numbered arrival and report how to acknowledge it.
    pub fn record_arrival(
        &self,
        sequence_id: &str,
        msg_num: u64,
        from_address: Option<&str>,
    ) -> AckDecision {
        self.tracker.record_arrival(sequence_id, msg_num, from_address)
    }

    /// Current ack ranges of an inbound sequence.
    pub fn ack_ranges(&self, sequence_id: &str) -> Option<Vec<AckRange>> {
        self.store
            .inbound(sequence_id)
            .map(|seq| seq.lock().ack_ranges())
    }

    /// Hand `sequence_id` to the ack worker, starting it if needed.
    pub fn schedule_ack(&self, sequence_id: &str) -> Result<()> {
        self.start()?;
        match self.scheduler.lock().as_ref() {
            Some(scheduler) => scheduler.schedule_ack(sequence_id),
            None => Err(Error::ShutDown),
        }
    }

    /// Process the `Sequence` header of an inbound request.
    ///
    /// # Returns
    /// - `Ok(None)` if the request has no `Sequence` header, or the ack was
    ///   deferred to the ack worker
    /// - `Ok(Some(response))` with the acknowledgement to return on this
    ///   exchange when the request's `From` is the anonymous URI
    ///
    /// # Errors
    /// - Protocol violations (`MissingIdentifier`, `MissingMessageNumber`,
    ///   `InvalidMessageNumber`, `MissingAddress`)
    /// - `ShutDown` after [`RmEngine::shutdown`], checked before anything
    ///   is recorded
    ///
    /// Protocol violations record nothing.
    pub fn handle_inbound(&self, request: &mut Envelope) -> Result<Option<Envelope>> {
        self.ensure_open()?;
        let Some(header) = request.sequence().cloned() else {
            return Ok(None);
        };
        let from = match request.from_address() {
            None => None,
            Some(None) => return Err(Error::MissingAddress),
            Some(Some(addr)) => Some(addr.to_string()),
        };

        let (id, decision) = self.tracker.record_header(&header, from.as_deref())?;
        for kind in [
            HeaderKind::Sequence,
            HeaderKind::From,
            HeaderKind::To,
            HeaderKind::MessageId,
            HeaderKind::Action,
        ] {
            request.mark_processed(kind);
        }

        match decision {
            AckDecision::Synchronous => {
                let mut response = Envelope::new();
                if let Some(seq) = self.store.inbound(&id) {
                    stamp_ack(&mut response, &seq.lock(), &self.ids);
                }
                self.metrics.increment_acks_sent_sync();
                log::trace!("[inbound] {}: synchronous ack", id);
                Ok(Some(response))
            }
            AckDecision::Deferred => {
                self.schedule_ack(&id)?;
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Sender side
    // ========================================================================

    /// Mint a fresh sequence identifier.
    pub fn new_sequence_id(&self) -> String {
        self.sequencer.new_sequence_id()
    }

    /// Number, record and transmit an application message.
    pub fn send(&self, request: SendRequest) -> Result<SendOutcome> {
        self.ensure_open()?;
        self.sequencer.send(request)
    }

    /// Apply one acknowledgement.
    pub fn apply_ack(&self, identifier: &str, ranges: &[AckRange]) -> Result<usize> {
        self.applier.apply_ack(identifier, ranges)
    }

    /// Apply every acknowledgement header of `request`; none is a no-op.
    pub fn handle_ack(&self, request: &mut Envelope) -> Result<usize> {
        self.applier.apply_envelope(request)
    }

    /// Apply piggybacked acks, then process the `Sequence` header.
    ///
    /// A piggybacked ack that cannot be applied (unknown sequence, missing
    /// identifier) is logged and counted in `acks_rejected`; it does not
    /// reject the message carrying it. A request without a `Sequence`
    /// header is a standalone ack and is applied strictly, as in
    /// [`RmEngine::handle_ack`].
    pub fn handle_incoming(&self, request: &mut Envelope) -> Result<Option<Envelope>> {
        if request.sequence().is_none() {
            self.handle_ack(request)?;
            return Ok(None);
        }
        self.applier.apply_piggybacked(request);
        self.handle_inbound(request)
    }

    /// True once the outbound sequence's last message and everything before
    /// it has been acknowledged.
    pub fn is_outbound_complete(&self, identifier: &str) -> bool {
        self.store
            .outbound(identifier)
            .is_some_and(|seq| seq.lock().is_complete())
    }

    /// Forget completed inbound and outbound sequences.
    ///
    /// Completed sequences are kept until this is called so
    /// [`RmEngine::is_outbound_complete`] can still report them. A late
    /// duplicate for an evicted inbound sequence starts a fresh one.
    pub fn evict_completed(&self) -> (usize, usize) {
        let (inbound, outbound) = self.store.evict_completed();
        if inbound + outbound > 0 {
            log::debug!(
                "[engine] evicted {} inbound / {} outbound completed sequence(s)",
                inbound,
                outbound
            );
        }
        (inbound, outbound)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &RmConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SequenceStore> {
        &self.store
    }

    pub fn retry(&self) -> &RetryEngine {
        &self.retry
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for RmEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmEngine")
            .field("config", &self.config)
            .field("inbound_sequences", &self.store.inbound_len())
            .field("outbound_sequences", &self.store.outbound_len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
