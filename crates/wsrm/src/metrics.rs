// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metrics for the reliable-messaging engine
//!
//! Tracks sends, retransmissions, acknowledgements and inbound gap/duplicate
//! detection.
//!
//! # Thread Safety
//!
//! All counters are `AtomicU64` updated with Relaxed ordering. A
//! [`MetricsSnapshot`] is a plain copy; individual fields may be read at
//! slightly different instants.

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine metrics collector.
#[derive(Debug, Default)]
pub struct RmMetrics {
    /// Application messages numbered and handed to the transport
    messages_sent: AtomicU64,
    /// Retransmissions performed by the retry loop
    retransmissions: AtomicU64,
    /// Transport failures (any path)
    send_failures: AtomicU64,
    /// Acks returned on the same exchange
    acks_sent_sync: AtomicU64,
    /// Acks sent out of band by the ack worker
    acks_sent_async: AtomicU64,
    /// SequenceAcknowledgement headers applied
    acks_applied: AtomicU64,
    /// In-flight records removed by acks
    records_acknowledged: AtomicU64,
    /// Piggybacked acks dropped (unknown sequence, missing identifier)
    acks_rejected: AtomicU64,
    /// Forward jumps that opened a gap
    gaps_detected: AtomicU64,
    /// Maximum gap size observed (high-water mark)
    max_gap_size: AtomicU64,
    /// Inbound messages already delivered
    duplicates_received: AtomicU64,
    /// Records dropped by a retry policy
    messages_abandoned: AtomicU64,
}

/// Point-in-time copy of [`RmMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub retransmissions: u64,
    pub send_failures: u64,
    pub acks_sent_sync: u64,
    pub acks_sent_async: u64,
    pub acks_applied: u64,
    pub records_acknowledged: u64,
    pub acks_rejected: u64,
    pub gaps_detected: u64,
    pub max_gap_size: u64,
    pub duplicates_received: u64,
    pub messages_abandoned: u64,
}

impl RmMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retransmissions(&self, count: u64) {
        self.retransmissions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_acks_sent_sync(&self) {
        self.acks_sent_sync.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_acks_sent_async(&self) {
        self.acks_sent_async.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one applied acknowledgement and how many records it removed.
    pub fn record_ack_applied(&self, removed: u64) {
        self.acks_applied.fetch_add(1, Ordering::Relaxed);
        self.records_acknowledged.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn increment_acks_rejected(&self) {
        self.acks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record gap detection (increment gaps_detected, update max_gap_size)
    pub fn record_gap(&self, gap_size: u64) {
        self.gaps_detected.fetch_add(1, Ordering::Relaxed);
        let mut current = self.max_gap_size.load(Ordering::Relaxed);
        while gap_size > current {
            match self.max_gap_size.compare_exchange_weak(
                current,
                gap_size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn increment_duplicates(&self) {
        self.duplicates_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_abandoned(&self, count: u64) {
        self.messages_abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn retransmissions(&self) -> u64 {
        self.retransmissions.load(Ordering::Relaxed)
    }

    pub fn messages_abandoned(&self) -> u64 {
        self.messages_abandoned.load(Ordering::Relaxed)
    }

    /// Load every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            acks_sent_sync: self.acks_sent_sync.load(Ordering::Relaxed),
            acks_sent_async: self.acks_sent_async.load(Ordering::Relaxed),
            acks_applied: self.acks_applied.load(Ordering::Relaxed),
            records_acknowledged: self.records_acknowledged.load(Ordering::Relaxed),
            acks_rejected: self.acks_rejected.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            max_gap_size: self.max_gap_size.load(Ordering::Relaxed),
            duplicates_received: self.duplicates_received.load(Ordering::Relaxed),
            messages_abandoned: self.messages_abandoned.load(Ordering::Relaxed),
        }
    }
}
