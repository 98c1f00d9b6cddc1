// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AckApplier - removes acknowledged messages from the retransmission set.

use std::sync::Arc;

use crate::envelope::{AckHeader, Envelope, HeaderKind};
use crate::metrics::RmMetrics;
use crate::sequence::{AckRange, SequenceStore};
use crate::{Error, Result};

/// Applies incoming `SequenceAcknowledgement`s to outbound sequences.
#[derive(Debug)]
pub struct AckApplier {
    store: Arc<SequenceStore>,
    metrics: Arc<RmMetrics>,
}

impl AckApplier {
    pub fn new(store: Arc<SequenceStore>) -> Self {
        Self::with_metrics(store, Arc::new(RmMetrics::new()))
    }

    pub fn with_metrics(store: Arc<SequenceStore>, metrics: Arc<RmMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Remove every in-flight record of `identifier` covered by `ranges`.
    ///
    /// Idempotent; malformed ranges (`upper < lower`) are ignored.
    ///
    /// # Returns
    /// Number of records removed.
    ///
    /// # Errors
    /// `UnknownSequence` if this sender never created `identifier`. No
    /// sequence is created in that case.
    pub fn apply_ack(&self, identifier: &str, ranges: &[AckRange]) -> Result<usize> {
        let entry = self.store.outbound(identifier).ok_or_else(|| {
            log::debug!("[applier] ack for unknown sequence {}", identifier);
            Error::UnknownSequence(identifier.to_string())
        })?;

        let removed = {
            let mut seq = entry.lock();
            let mut removed = 0;
            for range in ranges {
                if range.is_empty() {
                    log::trace!("[applier] {}: ignoring empty range {}", identifier, range);
                    continue;
                }
                removed += seq.acknowledge(*range);
            }
            if seq.is_complete() {
                log::debug!("[applier] {}: every message acknowledged", identifier);
            }
            removed
        };

        self.metrics.record_ack_applied(removed as u64);
        log::trace!(
            "[applier] {}: {} range(s), {} record(s) removed",
            identifier,
            ranges.len(),
            removed
        );
        Ok(removed)
    }

    /// Apply one header.
    ///
    /// # Errors
    /// `MissingIdentifier` if the header has no identifier, otherwise as
    /// [`AckApplier::apply_ack`].
    pub fn apply_header(&self, header: &AckHeader) -> Result<usize> {
        let id = header.identifier.as_deref().ok_or(Error::MissingIdentifier)?;
        self.apply_ack(id, &header.ranges)
    }

    /// Apply every `SequenceAcknowledgement` header of `envelope` and mark
    /// the ack and addressing headers processed.
    ///
    /// An envelope without acknowledgement headers is a no-op. Processing
    /// stops at the first failing header; headers before it stay applied.
    pub fn apply_envelope(&self, envelope: &mut Envelope) -> Result<usize> {
        let mut removed = 0;
        let mut seen = false;
        for header in envelope.acks() {
            seen = true;
            removed += self.apply_header(header)?;
        }
        if seen {
            for kind in [
                HeaderKind::SequenceAcknowledgement,
                HeaderKind::From,
                HeaderKind::To,
                HeaderKind::MessageId,
                HeaderKind::Action,
            ] {
                envelope.mark_processed(kind);
            }
        }
        Ok(removed)
    }

    /// Apply acks piggybacked on a sequenced message.
    ///
    /// Unlike [`AckApplier::apply_envelope`], a bad header is logged,
    /// counted and skipped: the carrying message must still be processed.
    /// A peer that lost its state would otherwise reject every resend of a
    /// message carrying the same stale ack.
    ///
    /// # Returns
    /// Records removed and the faults of the skipped headers.
    pub fn apply_piggybacked(&self, envelope: &mut Envelope) -> (usize, Vec<Error>) {
        let mut removed = 0;
        let mut faults = Vec::new();
        let mut seen = false;
        for header in envelope.acks() {
            seen = true;
            match self.apply_header(header) {
                Ok(n) => removed += n,
                Err(e) => {
                    self.metrics.increment_acks_rejected();
                    log::warn!("[applier] piggybacked ack skipped: {}", e);
                    faults.push(e);
                }
            }
        }
        if seen {
            envelope.mark_processed(HeaderKind::SequenceAcknowledgement);
        }
        (removed, faults)
    }
}
