// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acknowledgement construction, shared by the synchronous response path,
//! the deferred ack worker and outbound piggybacking.

use crate::config::{URI_ACK, URI_ANONYMOUS};
use crate::envelope::{AckHeader, Envelope, Header};
use crate::ids::IdGenerator;
use crate::sequence::{AckRange, InboundSequence};

/// Ack ranges for `seq`: `[1, highest_received]` minus the missing numbers,
/// as disjoint ascending inclusive ranges.
pub fn ack_ranges(seq: &InboundSequence) -> Vec<AckRange> {
    seq.ack_ranges()
}

/// `SequenceAcknowledgement` header for the current state of `seq`.
pub fn ack_header(seq: &InboundSequence) -> Header {
    Header::SequenceAcknowledgement(AckHeader::new(seq.id(), seq.ack_ranges()))
}

/// Turn `envelope` into an acknowledgement message for `seq`.
///
/// Adds the `SequenceAcknowledgement` header and stamps `Action` (ack URI),
/// `To` (the sequence endpoint, anonymous if none is known) and a fresh
/// `MessageID`.
pub fn stamp_ack(envelope: &mut Envelope, seq: &InboundSequence, ids: &IdGenerator) {
    envelope.push_header(ack_header(seq));
    envelope.set_header(Header::Action(URI_ACK.to_string()));
    envelope.set_header(Header::To(
        seq.endpoint().unwrap_or(URI_ANONYMOUS).to_string(),
    ));
    envelope.set_header(Header::MessageId(ids.message_id()));
}

/// Standalone acknowledgement message for `seq`.
pub fn build_ack_envelope(seq: &InboundSequence, ids: &IdGenerator) -> Envelope {
    let mut env = Envelope::new();
    stamp_ack(&mut env, seq, ids);
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_ack_envelope_headers() {
        let ids = IdGenerator::with_clock(Arc::new(ManualClock::new(5)));
        let mut seq = InboundSequence::new("urn:identifier-1");
        seq.set_endpoint_if_unset(Some("http://client"));
        for n in [1, 2, 4] {
            seq.on_receive(n);
        }

        let env = build_ack_envelope(&seq, &ids);
        let ack = env.acks().next().expect("ack header");
        assert_eq!(ack.identifier.as_deref(), Some("urn:identifier-1"));
        assert_eq!(ack.ranges, vec![AckRange::new(1, 2), AckRange::new(4, 4)]);
        assert_eq!(env.action(), Some(URI_ACK));
        assert_eq!(env.to(), Some("http://client"));
        assert_eq!(env.message_id(), Some("urn:messageID-5-1"));
    }

    #[test]
    fn test_stamp_preserves_existing_headers() {
        let ids = IdGenerator::new();
        let mut seq = InboundSequence::new("s");
        seq.on_receive(1);
        let mut env = Envelope::with_body(b"reply".to_vec())
            .with_header(Header::Action("urn:app:Reply".into()));

        stamp_ack(&mut env, &seq, &ids);
        assert_eq!(env.acks().count(), 1);
        assert_eq!(env.action(), Some(URI_ACK));
        assert_eq!(env.to(), Some(URI_ANONYMOUS));
        assert_eq!(env.body(), b"reply");
    }
}
