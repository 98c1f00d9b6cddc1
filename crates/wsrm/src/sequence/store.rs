// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SequenceStore - Thread-safe registry of inbound and outbound sequences
//!
//! Shared by every component of the engine:
//! - Message-handling threads: inbound arrivals, outbound sends, incoming acks
//! - Ack worker: ack-range computation for deferred acks
//! - Retry loop: scan of in-flight records
//!
//! Uses DashMap for the identifier lookup and one `parking_lot::Mutex` per
//! sequence, so work on one sequence never blocks another. Lookups hand out
//! the `Arc` and drop the shard guard before the entry lock is taken.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{InboundSequence, OutboundSequence};

/// Shared handle to one inbound sequence.
pub type InboundEntry = Arc<Mutex<InboundSequence>>;

/// Shared handle to one outbound sequence.
pub type OutboundEntry = Arc<Mutex<OutboundSequence>>;

/// Registry of sequence state, keyed by sequence identifier.
///
/// Inbound and outbound records are distinct maps sharing one identifier
/// namespace: the same identifier may exist in both.
#[derive(Debug, Default)]
pub struct SequenceStore {
    inbound: DashMap<String, InboundEntry>,
    outbound: DashMap<String, OutboundEntry>,
}

impl SequenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Look up an inbound sequence, creating empty state on first sight.
    pub fn inbound_or_insert(&self, id: &str) -> InboundEntry {
        if let Some(entry) = self.inbound.get(id) {
            return Arc::clone(entry.value());
        }
        let entry = self
            .inbound
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(InboundSequence::new(id))));
        Arc::clone(entry.value())
    }

    /// Look up an inbound sequence without creating it.
    pub fn inbound(&self, id: &str) -> Option<InboundEntry> {
        self.inbound.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Inbound sequences whose reply-to endpoint equals `endpoint`.
    ///
    /// Used to piggyback acks on outbound traffic to the same peer.
    pub fn inbound_for_endpoint(&self, endpoint: &str) -> Vec<InboundEntry> {
        self.inbound
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|seq| seq.lock().endpoint() == Some(endpoint))
            .collect()
    }

    /// Number of inbound sequences.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Look up an outbound sequence, creating it with `destination` on first
    /// send. An existing sequence keeps its original destination.
    pub fn outbound_or_insert(&self, id: &str, destination: &str) -> OutboundEntry {
        if let Some(entry) = self.outbound.get(id) {
            return Arc::clone(entry.value());
        }
        let entry = self.outbound.entry(id.to_string()).or_insert_with(|| {
            log::debug!("[sequencer] new outbound sequence {} -> {}", id, destination);
            Arc::new(Mutex::new(OutboundSequence::new(id, destination)))
        });
        Arc::clone(entry.value())
    }

    /// Look up an outbound sequence without creating it.
    pub fn outbound(&self, id: &str) -> Option<OutboundEntry> {
        self.outbound.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Point-in-time list of outbound sequences.
    ///
    /// The retry loop iterates this list instead of the map, so no shard
    /// guard is held while a sequence is locked and resent.
    pub fn outbound_snapshot(&self) -> Vec<OutboundEntry> {
        self.outbound.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of outbound sequences.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Total in-flight records across all outbound sequences.
    pub fn in_flight_total(&self) -> usize {
        self.outbound_snapshot()
            .iter()
            .map(|seq| seq.lock().in_flight_len())
            .sum()
    }

    /// Drop every completed sequence.
    ///
    /// Inbound: last message seen with no gap before it. Outbound: last
    /// message sent and nothing left in flight.
    ///
    /// # Returns
    /// `(inbound, outbound)` counts of evicted sequences.
    pub fn evict_completed(&self) -> (usize, usize) {
        let before = (self.inbound.len(), self.outbound.len());
        self.inbound.retain(|_, seq| !seq.lock().is_complete());
        self.outbound.retain(|_, seq| !seq.lock().is_complete());
        (
            before.0.saturating_sub(self.inbound.len()),
            before.1.saturating_sub(self.outbound.len()),
        )
    }
}
