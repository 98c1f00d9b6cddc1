// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # wsrm - Reliable messaging over one-way transports
//!
//! A WS-ReliableMessaging style engine: at-least-once, duplicate-detectable,
//! gap-aware delivery of messages grouped into named sequences.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use wsrm::config::URI_ANONYMOUS;
//! use wsrm::{MemoryTransport, Result, RmConfig, RmEngine, SendRequest};
//!
//! fn main() -> Result<()> {
//!     let transport = Arc::new(MemoryTransport::new());
//!     let engine = RmEngine::new(transport.clone(), RmConfig::default())?;
//!
//!     let id = engine.new_sequence_id();
//!     let outcome = engine.send(SendRequest::new(&id, "http://server/rm", URI_ANONYMOUS))?;
//!     assert_eq!(outcome.message_number(), 1);
//!     assert_eq!(transport.len(), 1);
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                    Message-handling layer (external)                |
//! |        header extraction | envelope rendering | wire transport      |
//! +---------------------------------------------------------------------+
//! |                             RmEngine                                |
//! |  InboundTracker -> sync ack | AckScheduler (worker) -> deferred ack |
//! |  OutboundSequencer -> RetryEngine (loop)  |  AckApplier             |
//! +---------------------------------------------------------------------+
//! |                           SequenceStore                             |
//! |      inbound: gaps, highest received | outbound: in-flight set      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RmEngine`] | Owns the store and both background services |
//! | [`SequenceStore`] | Per-sequence state behind per-entry locks |
//! | [`AckRange`] | Inclusive `[lower, upper]` acknowledgement range |
//! | [`Envelope`] | Header blocks plus opaque body |
//! | [`Transport`] | One-way send primitive supplied by the caller |

/// Acknowledgement construction.
pub mod ack;
/// Incoming acknowledgement application.
pub mod applier;
/// Injectable wall clocks.
pub mod clock;
/// Protocol constants and runtime configuration.
pub mod config;
/// Engine facade.
pub mod engine;
/// Envelope and header model.
pub mod envelope;
/// Error type.
pub mod error;
/// Sequence and message identifier minting.
pub mod ids;
/// Receiver-side arrival tracking.
pub mod inbound;
/// Atomic counters.
pub mod metrics;
/// Retransmission loop and retry policies.
pub mod retry;
/// Deferred ack worker.
pub mod scheduler;
/// Sequence state and the shared store.
pub mod sequence;
/// Outgoing message numbering and transmission.
pub mod sequencer;
/// One-way transport seam.
pub mod transport;

pub use applier::AckApplier;
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use config::{RetryPolicyKind, RmConfig};
pub use engine::RmEngine;
pub use envelope::{AckHeader, Envelope, Header, HeaderKind, SequenceHeader};
pub use error::{Error, Result};
pub use ids::IdGenerator;
pub use inbound::{AckDecision, InboundTracker};
pub use metrics::{MetricsSnapshot, RmMetrics};
pub use retry::{
    ExponentialBackoff, FixedInterval, RetryDecision, RetryEngine, RetryPolicy, ScanReport,
};
pub use scheduler::{AckQueue, AckScheduler};
pub use sequence::{
    AckRange, Arrival, InboundSequence, MessageRecord, OutboundSequence, SequenceStore,
};
pub use sequencer::{OutboundSequencer, SendOutcome, SendRequest};
pub use transport::{MemoryTransport, Transport};
