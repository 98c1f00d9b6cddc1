// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identifier minting for sequences and messages.
//!
//! Tokens are `<urn prefix><millis>-<counter>`. The millisecond part keeps
//! tokens distinct across process restarts; the atomic counter keeps them
//! distinct within one millisecond.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{SystemClock, TimeSource};
use crate::config::{IDENTIFIER_URN_PREFIX, MESSAGE_ID_URN_PREFIX};

/// Mints unique sequence identifiers and message ids.
///
/// # Thread Safety
///
/// All methods take `&self`; the counter is a single `AtomicU64`.
pub struct IdGenerator {
    clock: Arc<dyn TimeSource>,
    counter: AtomicU64,
}

impl IdGenerator {
    /// Create a generator backed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a generator backed by an explicit clock.
    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            counter: AtomicU64::new(1),
        }
    }

    /// New sequence identifier (`urn:identifier-...`).
    pub fn sequence_id(&self) -> String {
        self.mint(IDENTIFIER_URN_PREFIX)
    }

    /// New message id (`urn:messageID-...`).
    pub fn message_id(&self) -> String {
        self.mint(MESSAGE_ID_URN_PREFIX)
    }

    fn mint(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}-{}", prefix, self.clock.now_ms(), n)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .finish()
    }
}
