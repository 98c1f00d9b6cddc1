// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-way transport seam.
//!
//! The engine only ever needs "send this envelope to that address, no
//! reply expected". Deferred acks, retransmissions and every outbound
//! application message go through [`Transport::send_one_way`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::envelope::Envelope;
use crate::{Error, Result};

/// One-way send primitive supplied by the message-handling layer.
///
/// Implementations must be thread-safe: the ack worker, the retry loop and
/// application threads call it concurrently.
pub trait Transport: Send + Sync {
    /// Send `envelope` to `destination` without waiting for a reply.
    ///
    /// # Returns
    /// - `Ok(())` once the envelope is handed to the wire
    /// - `Err(Error::SendFailed)` if it could not be sent
    fn send_one_way(&self, envelope: &Envelope, destination: &str) -> Result<()>;
}

/// In-memory transport that records every send.
///
/// Can be switched into failure mode, in which sends return
/// [`Error::SendFailed`] and nothing is recorded.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<(String, Envelope)>>,
    failing: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Copy of everything sent so far as `(destination, envelope)` pairs.
    pub fn sent(&self) -> Vec<(String, Envelope)> {
        self.sent.lock().clone()
    }

    /// Sends addressed to `destination`.
    pub fn sent_to(&self, destination: &str) -> Vec<Envelope> {
        self.sent
            .lock()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    /// Remove and return everything recorded.
    pub fn take(&self) -> Vec<(String, Envelope)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for MemoryTransport {
    fn send_one_way(&self, envelope: &Envelope, destination: &str) -> Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(Error::SendFailed(format!(
                "memory transport failing (destination {})",
                destination
            )));
        }
        self.sent
            .lock()
            .push((destination.to_string(), envelope.clone()));
        Ok(())
    }
}
