// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sequence state: acknowledgement ranges, receiver-side gap tracking,
//! sender-side in-flight records and the shared store that owns them all.

mod inbound;
mod outbound;
mod range;
mod store;

pub use inbound::{Arrival, InboundSequence};
pub use outbound::{MessageRecord, OutboundSequence};
pub use range::AckRange;
pub use store::{InboundEntry, OutboundEntry, SequenceStore};
