// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sender-side sequence state and the in-flight retransmission set.
//!
//! In-flight records live in a `BTreeMap` keyed by message number. Range
//! acknowledgement collects the matching keys first and removes them
//! afterwards, so no element is skipped while the map shrinks.

use std::collections::btree_map;
use std::collections::BTreeMap;

use super::AckRange;
use crate::envelope::Envelope;

/// A sent message kept for possible retransmission.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Message number within the sequence.
    pub seq_num: u64,
    /// Time of the first transmission (ms).
    pub first_sent_ms: u64,
    /// Time of the latest transmission (ms); refreshed on every resend.
    pub last_sent_ms: u64,
    /// Retransmissions so far (0 = only the original send).
    pub retransmissions: u32,
    /// Envelope resent verbatim.
    pub payload: Envelope,
}

impl MessageRecord {
    pub fn new(seq_num: u64, now_ms: u64, payload: Envelope) -> Self {
        Self {
            seq_num,
            first_sent_ms: now_ms,
            last_sent_ms: now_ms,
            retransmissions: 0,
            payload,
        }
    }

    /// Milliseconds since the latest transmission.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_sent_ms)
    }

    /// Refresh after a retransmission.
    pub fn mark_resent(&mut self, now_ms: u64) {
        self.last_sent_ms = now_ms;
        self.retransmissions = self.retransmissions.saturating_add(1);
    }
}

/// Sender-side state for one sequence.
#[derive(Debug)]
pub struct OutboundSequence {
    id: String,
    destination: String,
    next_msg_num: u64,
    in_flight: BTreeMap<u64, MessageRecord>,
    last_message: Option<u64>,
}

impl OutboundSequence {
    /// Create sequence state; numbering starts at 1.
    pub fn new(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            next_msg_num: 1,
            in_flight: BTreeMap::new(),
            last_message: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Destination fixed by the first send.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Number the next `allocate(false)` will return.
    pub fn next_msg_num(&self) -> u64 {
        self.next_msg_num
    }

    /// Allocate the next message number.
    ///
    /// With `skip`, one number is consumed and discarded first, leaving a
    /// deliberate gap on the receiver side.
    pub fn allocate(&mut self, skip: bool) -> u64 {
        if skip {
            log::debug!(
                "[sequencer] {}: skipping message number {}",
                self.id,
                self.next_msg_num
            );
            self.next_msg_num += 1;
        }
        let n = self.next_msg_num;
        self.next_msg_num += 1;
        n
    }

    /// Record a sent message.
    pub fn record(&mut self, record: MessageRecord) {
        self.in_flight.insert(record.seq_num, record);
    }

    /// Remember the number that carried the last-message marker.
    pub fn mark_last_message(&mut self, n: u64) {
        self.last_message = Some(n);
    }

    pub fn last_message(&self) -> Option<u64> {
        self.last_message
    }

    /// Remove every in-flight record inside `range`. Returns the number
    /// removed; empty (malformed) ranges remove nothing.
    pub fn acknowledge(&mut self, range: AckRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        let acked: Vec<u64> = self
            .in_flight
            .range(range.as_inclusive())
            .map(|(n, _)| *n)
            .collect();
        for n in &acked {
            self.in_flight.remove(n);
        }
        acked.len()
    }

    /// Remove one record (used when a retry policy gives up on it).
    pub fn remove(&mut self, seq_num: u64) -> Option<MessageRecord> {
        self.in_flight.remove(&seq_num)
    }

    pub fn get(&self, seq_num: u64) -> Option<&MessageRecord> {
        self.in_flight.get(&seq_num)
    }

    /// In-flight records in ascending message-number order.
    pub fn in_flight(&self) -> btree_map::Values<'_, u64, MessageRecord> {
        self.in_flight.values()
    }

    pub fn in_flight_mut(&mut self) -> btree_map::ValuesMut<'_, u64, MessageRecord> {
        self.in_flight.values_mut()
    }

    pub fn in_flight_numbers(&self) -> Vec<u64> {
        self.in_flight.keys().copied().collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// True once the last message has been sent and nothing is in flight.
    pub fn is_complete(&self) -> bool {
        self.last_message.is_some() && self.in_flight.is_empty()
    }
}
