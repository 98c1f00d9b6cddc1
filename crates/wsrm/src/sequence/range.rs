// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acknowledgement range abstraction
//!
//! WS-RM acknowledgements carry `AcknowledgementRange` elements with
//! **inclusive** `Lower` and `Upper` attributes. This type keeps the wire
//! convention and provides the conversions the rest of the engine needs.

use std::ops::RangeInclusive;

/// Inclusive acknowledgement range `[lower, upper]`.
///
/// # Malformed Ranges
///
/// A peer may send `upper < lower`. Such a range is *empty*: it contains no
/// message number and applying it is a no-op. Construction never panics so
/// that values taken straight off the wire can be represented.
///
/// # Example
///
/// ```ignore
/// let r = AckRange::new(1, 2);
/// assert!(r.contains(2));
/// assert_eq!(r.len(), 2);
///
/// let bad = AckRange::new(5, 3);
/// assert!(bad.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckRange {
    /// Lowest acknowledged message number (inclusive).
    pub lower: u64,
    /// Highest acknowledged message number (inclusive).
    pub upper: u64,
}

impl AckRange {
    /// Create range from inclusive bounds.
    pub fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }

    /// Single-message range `[n, n]`.
    pub fn single(n: u64) -> Self {
        Self { lower: n, upper: n }
    }

    /// True if the range covers no message number.
    pub fn is_empty(&self) -> bool {
        self.upper < self.lower
    }

    /// Check if range contains message number `n`.
    pub fn contains(&self, n: u64) -> bool {
        self.lower <= n && n <= self.upper
    }

    /// Number of message numbers in the range.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.upper - self.lower + 1
        }
    }

    /// As a standard inclusive range (empty when malformed).
    pub fn as_inclusive(&self) -> RangeInclusive<u64> {
        self.lower..=self.upper
    }

    /// Iterate message numbers in the range.
    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.as_inclusive()
    }
}

impl From<RangeInclusive<u64>> for AckRange {
    fn from(range: RangeInclusive<u64>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}

impl std::fmt::Display for AckRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}
