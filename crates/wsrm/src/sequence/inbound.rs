// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver-side sequence state and gap tracking.
//!
//! Missing message numbers are held as sorted, disjoint `[start..end)` ranges
//! rather than one entry per number, so a peer that jumps from message 1 to
//! message 1_000_000 costs one range, not a million set entries.

use std::ops::Range;

use super::AckRange;

/// Outcome of recording one arrival, used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// `n == highest + 1`.
    InOrder,
    /// `n > highest + 1`; carries how many numbers became missing.
    Gap(u64),
    /// `n` was missing and is now delivered.
    FilledGap,
    /// `n` had already been delivered.
    Duplicate,
    /// Message number 0 is not a valid position and is ignored.
    Ignored,
}

/// Receiver-side state for one sequence.
///
/// # Invariants
///
/// - Every `n` in `1..=highest_received` is either delivered or inside one of
///   the `missing` ranges.
/// - `missing` ranges are sorted, disjoint, non-adjacent and all end at or
///   below `highest_received`.
/// - `highest_received` never decreases.
///
/// # Example
///
/// ```ignore
/// let mut seq = InboundSequence::new("urn:identifier-1");
/// seq.on_receive(1);
/// seq.on_receive(2);
/// seq.on_receive(4);
/// assert_eq!(seq.missing_numbers().collect::<Vec<_>>(), vec![3]);
/// ```
#[derive(Debug, Clone)]
pub struct InboundSequence {
    id: String,
    endpoint: Option<String>,
    highest_received: u64,
    missing: Vec<Range<u64>>,
    last_message: Option<u64>,
}

impl InboundSequence {
    /// Create empty state (`highest_received = 0`, nothing missing).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: None,
            highest_received: 0,
            missing: Vec::new(),
            last_message: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reply-to address captured from the first message that carried one.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Set the endpoint unless one is already fixed. Returns true if set.
    pub fn set_endpoint_if_unset(&mut self, endpoint: Option<&str>) -> bool {
        match (&self.endpoint, endpoint) {
            (None, Some(addr)) => {
                self.endpoint = Some(addr.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn highest_received(&self) -> u64 {
        self.highest_received
    }

    /// Message number that carried the last-message marker, if seen.
    pub fn last_message(&self) -> Option<u64> {
        self.last_message
    }

    /// Record that the peer marked `n` as the final message.
    pub fn mark_last_message(&mut self, n: u64) {
        self.last_message = Some(n);
    }

    /// Record arrival of message `n`.
    ///
    /// # Cases
    ///
    /// 1. **Contiguous**: `n == highest + 1` -> advance `highest`
    /// 2. **Forward jump**: `n > highest + 1` -> `[highest+1..n)` becomes missing
    /// 3. **Fill-in**: `n <= highest` and missing -> split the covering range
    /// 4. **Duplicate**: `n <= highest` and already delivered -> no-op
    pub fn on_receive(&mut self, n: u64) -> Arrival {
        if n == 0 {
            return Arrival::Ignored;
        }

        if n > self.highest_received {
            let gap_start = self.highest_received + 1;
            self.highest_received = n;
            if n > gap_start {
                // Every existing range ends at or below the old highest, which
                // was delivered, so the new range is never adjacent to them.
                self.missing.push(gap_start..n);
                return Arrival::Gap(n - gap_start);
            }
            return Arrival::InOrder;
        }

        let idx = self.missing.partition_point(|r| r.end <= n);
        match self.missing.get(idx) {
            Some(r) if r.start <= n => {
                let r = self.missing.remove(idx);
                let mut at = idx;
                if r.start < n {
                    self.missing.insert(at, r.start..n);
                    at += 1;
                }
                if n + 1 < r.end {
                    self.missing.insert(at, (n + 1)..r.end);
                }
                Arrival::FilledGap
            }
            _ => Arrival::Duplicate,
        }
    }

    /// Missing ranges (`[start..end)`, sorted, disjoint).
    pub fn missing_ranges(&self) -> &[Range<u64>] {
        &self.missing
    }

    /// Missing message numbers in ascending order.
    pub fn missing_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.missing.iter().flat_map(|r| r.clone())
    }

    pub fn is_missing(&self, n: u64) -> bool {
        let idx = self.missing.partition_point(|r| r.end <= n);
        self.missing.get(idx).is_some_and(|r| r.start <= n)
    }

    /// True if `n` has been delivered.
    pub fn is_delivered(&self, n: u64) -> bool {
        n >= 1 && n <= self.highest_received && !self.is_missing(n)
    }

    /// Total count of missing message numbers.
    pub fn total_missing(&self) -> u64 {
        self.missing.iter().map(|r| r.end - r.start).sum()
    }

    /// True once the last message and everything before it has arrived.
    pub fn is_complete(&self) -> bool {
        self.last_message
            .is_some_and(|last| self.highest_received >= last && self.missing.is_empty())
    }

    /// Acknowledgement ranges covering `[1, highest_received]` minus missing.
    ///
    /// Walks the missing ranges in ascending order: each one closes the open
    /// range just below it and reopens just above it; the final open range is
    /// closed at `highest_received`. Nothing received yet -> no ranges.
    pub fn ack_ranges(&self) -> Vec<AckRange> {
        let mut ranges = Vec::with_capacity(self.missing.len() + 1);
        if self.highest_received == 0 {
            return ranges;
        }

        let mut start = 1u64;
        for gap in &self.missing {
            if start < gap.start {
                ranges.push(AckRange::new(start, gap.start - 1));
            }
            start = gap.end;
        }
        if start <= self.highest_received {
            ranges.push(AckRange::new(start, self.highest_received));
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrive(seq: &mut InboundSequence, nums: &[u64]) {
        for &n in nums {
            seq.on_receive(n);
        }
    }

    #[test]
    fn test_contiguous_arrivals() {
        let mut seq = InboundSequence::new("s");
        assert_eq!(seq.on_receive(1), Arrival::InOrder);
        assert_eq!(seq.on_receive(2), Arrival::InOrder);
        assert_eq!(seq.highest_received(), 2);
        assert_eq!(seq.total_missing(), 0);
        assert_eq!(seq.ack_ranges(), vec![AckRange::new(1, 2)]);
    }

    #[test]
    fn test_gap_then_fill() {
        let mut seq = InboundSequence::new("s");
        arrive(&mut seq, &[1, 2]);
        assert_eq!(seq.on_receive(4), Arrival::Gap(1));
        assert_eq!(seq.missing_numbers().collect::<Vec<_>>(), vec![3]);
        assert_eq!(
            seq.ack_ranges(),
            vec![AckRange::new(1, 2), AckRange::new(4, 4)]
        );

        assert_eq!(seq.on_receive(3), Arrival::FilledGap);
        assert_eq!(seq.total_missing(), 0);
        assert_eq!(seq.ack_ranges(), vec![AckRange::new(1, 4)]);
    }

    #[test]
    fn test_fill_middle_splits_range() {
        let mut seq = InboundSequence::new("s");
        arrive(&mut seq, &[1, 7]);
        assert_eq!(seq.missing_ranges(), &[2..7]);

        seq.on_receive(4);
        assert_eq!(seq.missing_ranges(), &[2..4, 5..7]);
        assert_eq!(
            seq.ack_ranges(),
            vec![AckRange::new(1, 1), AckRange::new(4, 4), AckRange::new(7, 7)]
        );
    }

    #[test]
    fn test_fill_range_edges() {
        let mut seq = InboundSequence::new("s");
        arrive(&mut seq, &[1, 5]);
        seq.on_receive(2);
        assert_eq!(seq.missing_ranges(), &[3..5]);
        seq.on_receive(4);
        assert_eq!(seq.missing_ranges(), &[3..4]);
    }

    #[test]
    fn test_first_arrival_out_of_order() {
        let mut seq = InboundSequence::new("s");
        assert_eq!(seq.on_receive(3), Arrival::Gap(2));
        assert_eq!(seq.missing_numbers().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(seq.ack_ranges(), vec![AckRange::new(3, 3)]);
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut seq = InboundSequence::new("s");
        arrive(&mut seq, &[1, 2, 4, 3]);
        let before = seq.clone();

        assert_eq!(seq.on_receive(3), Arrival::Duplicate);
        assert_eq!(seq.on_receive(4), Arrival::Duplicate);
        assert_eq!(seq.highest_received(), before.highest_received());
        assert_eq!(seq.missing_ranges(), before.missing_ranges());
        assert!(!seq.is_missing(3));
    }

    #[test]
    fn test_zero_ignored() {
        let mut seq = InboundSequence::new("s");
        assert_eq!(seq.on_receive(0), Arrival::Ignored);
        assert_eq!(seq.highest_received(), 0);
        assert!(seq.ack_ranges().is_empty());
    }

    #[test]
    fn test_endpoint_fixed_once_set() {
        let mut seq = InboundSequence::new("s");
        assert!(!seq.set_endpoint_if_unset(None));
        assert!(seq.set_endpoint_if_unset(Some("http://a")));
        assert!(!seq.set_endpoint_if_unset(Some("http://b")));
        assert_eq!(seq.endpoint(), Some("http://a"));
    }

    #[test]
    fn test_large_jump_is_one_range() {
        let mut seq = InboundSequence::new("s");
        seq.on_receive(1);
        seq.on_receive(1_000_000);
        assert_eq!(seq.missing_ranges().len(), 1);
        assert_eq!(seq.total_missing(), 999_998);
    }

    #[test]
    fn test_completion_after_last_message() {
        let mut seq = InboundSequence::new("s");
        arrive(&mut seq, &[1, 3]);
        seq.mark_last_message(3);
        assert!(!seq.is_complete());
        seq.on_receive(2);
        assert!(seq.is_complete());
        assert!(seq.is_delivered(2));
    }
}
