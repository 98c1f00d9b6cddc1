// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InboundTracker - receiver-side arrival recording.
//!
//! Updates gap and duplicate state for every numbered inbound message and
//! decides how the message is acknowledged:
//!
//! ```text
//! From == anonymous  -> Synchronous: ack rides on the response of this exchange
//! anything else      -> Deferred:    sequence handed to the ack scheduler
//! ```
//!
//! Arrivals are never rejected: duplicates and gap fills are recorded and
//! acknowledged like any other message.

use std::sync::Arc;

use crate::config::URI_ANONYMOUS;
use crate::envelope::SequenceHeader;
use crate::metrics::RmMetrics;
use crate::sequence::{Arrival, SequenceStore};
use crate::{Error, Result};

/// How an inbound message must be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Ack on the response of the current exchange.
    Synchronous,
    /// Ack later, out of band, through the ack scheduler.
    Deferred,
}

/// Records inbound arrivals into the shared [`SequenceStore`].
#[derive(Debug)]
pub struct InboundTracker {
    store: Arc<SequenceStore>,
    metrics: Arc<RmMetrics>,
}

impl InboundTracker {
    pub fn new(store: Arc<SequenceStore>, metrics: Arc<RmMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Record arrival of message `msg_num` on sequence `sequence_id`.
    ///
    /// Creates the sequence on first sight and fixes its endpoint from the
    /// first non-empty `from_address`. Never fails.
    pub fn record_arrival(
        &self,
        sequence_id: &str,
        msg_num: u64,
        from_address: Option<&str>,
    ) -> AckDecision {
        self.record(sequence_id, msg_num, from_address, false)
    }

    fn record(
        &self,
        sequence_id: &str,
        msg_num: u64,
        from_address: Option<&str>,
        last_message: bool,
    ) -> AckDecision {
        let entry = self.store.inbound_or_insert(sequence_id);
        {
            let mut seq = entry.lock();
            if last_message {
                seq.mark_last_message(msg_num);
            }
            if seq.set_endpoint_if_unset(from_address) {
                log::debug!(
                    "[inbound] {}: endpoint set to {}",
                    sequence_id,
                    from_address.unwrap_or_default()
                );
            }

            match seq.on_receive(msg_num) {
                Arrival::InOrder | Arrival::FilledGap => {
                    log::trace!("[inbound] {}: received #{}", sequence_id, msg_num);
                }
                Arrival::Gap(size) => {
                    self.metrics.record_gap(size);
                    log::debug!(
                        "[inbound] {}: received #{}, {} message(s) missing",
                        sequence_id,
                        msg_num,
                        size
                    );
                }
                Arrival::Duplicate => {
                    self.metrics.increment_duplicates();
                    log::trace!("[inbound] {}: duplicate #{}", sequence_id, msg_num);
                }
                Arrival::Ignored => {}
            }
        }

        if from_address == Some(URI_ANONYMOUS) {
            AckDecision::Synchronous
        } else {
            AckDecision::Deferred
        }
    }

    /// Validate a `Sequence` header and record it.
    ///
    /// # Errors
    /// - `MissingIdentifier` / `MissingMessageNumber` if a field is absent
    /// - `InvalidMessageNumber` for message number 0
    ///
    /// Nothing is recorded when validation fails.
    pub fn record_header(
        &self,
        header: &SequenceHeader,
        from_address: Option<&str>,
    ) -> Result<(String, AckDecision)> {
        let id = header.identifier.as_deref().ok_or(Error::MissingIdentifier)?;
        let msg_num = header.message_number.ok_or(Error::MissingMessageNumber)?;
        if msg_num == 0 {
            return Err(Error::InvalidMessageNumber(0));
        }

        let decision = self.record(id, msg_num, from_address, header.last_message);
        Ok((id.to_string(), decision))
    }
}
