// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OutboundSequencer - numbering, decoration and first transmission of
//! outgoing application messages.
//!
//! For every send:
//!
//! 1. look up or create the outbound sequence (first send fixes the destination)
//! 2. allocate the next message number (optionally skipping one)
//! 3. add `Sequence`, `Action`, `From`, `To` and `MessageID` headers
//! 4. piggyback an ack for every inbound sequence whose endpoint is the destination
//! 5. record the message for retransmission, then transmit it one-way
//! 6. make sure the retry loop is running

use std::sync::Arc;

use crate::ack::ack_header;
use crate::clock::TimeSource;
use crate::config::PING_URI;
use crate::envelope::{Envelope, Header, SequenceHeader};
use crate::ids::IdGenerator;
use crate::metrics::RmMetrics;
use crate::retry::RetryEngine;
use crate::sequence::{MessageRecord, SequenceStore};
use crate::transport::Transport;
use crate::{Error, Result};

/// One outgoing application message.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub identifier: String,
    pub destination: String,
    /// Our reply-to address (may be the anonymous URI).
    pub from: String,
    pub last_message: bool,
    /// Consume and discard one message number before this send.
    pub skip: bool,
    /// `Action` header; defaults to the ping action.
    pub action: Option<String>,
    /// Application envelope to decorate.
    pub envelope: Envelope,
}

impl SendRequest {
    pub fn new(
        identifier: impl Into<String>,
        destination: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            destination: destination.into(),
            from: from.into(),
            last_message: false,
            skip: false,
            action: None,
            envelope: Envelope::new(),
        }
    }

    pub fn with_last_message(mut self, last: bool) -> Self {
        self.last_message = last;
        self
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.envelope.set_body(body);
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }
}

/// Result of a send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// The record kept for retransmission (payload is the decorated envelope).
    pub record: MessageRecord,
    /// False if the first transmission failed; the retry loop covers it.
    pub transmitted: bool,
}

impl SendOutcome {
    pub fn message_number(&self) -> u64 {
        self.record.seq_num
    }

    pub fn message_id(&self) -> Option<&str> {
        self.record.payload.message_id()
    }
}

/// Sender side of the engine.
pub struct OutboundSequencer {
    store: Arc<SequenceStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn TimeSource>,
    ids: Arc<IdGenerator>,
    metrics: Arc<RmMetrics>,
    retry: Arc<RetryEngine>,
}

impl OutboundSequencer {
    pub(crate) fn new(
        store: Arc<SequenceStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn TimeSource>,
        ids: Arc<IdGenerator>,
        metrics: Arc<RmMetrics>,
        retry: Arc<RetryEngine>,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            ids,
            metrics,
            retry,
        }
    }

    /// Mint a fresh sequence identifier.
    pub fn new_sequence_id(&self) -> String {
        self.ids.sequence_id()
    }

    /// Number, decorate, record and transmit one message.
    ///
    /// # Errors
    /// - `MissingIdentifier` for an empty identifier
    /// - `MissingAddress` for an empty destination
    ///
    /// A failed first transmission is not an error: the record is kept and
    /// `transmitted` is false.
    pub fn send(&self, request: SendRequest) -> Result<SendOutcome> {
        if request.identifier.is_empty() {
            return Err(Error::MissingIdentifier);
        }
        if request.destination.is_empty() {
            return Err(Error::MissingAddress);
        }

        let SendRequest {
            identifier,
            destination,
            from,
            last_message,
            skip,
            action,
            mut envelope,
        } = request;

        let entry = self.store.outbound_or_insert(&identifier, &destination);
        let (record, destination) = {
            let mut seq = entry.lock();
            let msg_num = seq.allocate(skip);
            if last_message {
                seq.mark_last_message(msg_num);
            }
            let destination = seq.destination().to_string();

            envelope.push_header(Header::Sequence(
                SequenceHeader::new(identifier.as_str(), msg_num).with_last_message(last_message),
            ));
            envelope.set_header(Header::Action(
                action.unwrap_or_else(|| PING_URI.to_string()),
            ));
            envelope.set_header(Header::From(Some(from)));
            envelope.set_header(Header::To(destination.clone()));
            envelope.set_header(Header::MessageId(self.ids.message_id()));
            self.piggyback_acks(&mut envelope, &destination);

            let record = MessageRecord::new(msg_num, self.clock.now_ms(), envelope);
            seq.record(record.clone());
            (record, destination)
        };

        self.metrics.increment_messages_sent();
        self.retry.ensure_running();

        let transmitted = match self.transport.send_one_way(&record.payload, &destination) {
            Ok(()) => {
                log::trace!(
                    "[sequencer] {} #{} sent to {}",
                    identifier,
                    record.seq_num,
                    destination
                );
                true
            }
            Err(e) => {
                self.metrics.increment_send_failures();
                log::warn!(
                    "[sequencer] {} #{} to {} failed, left to retry: {}",
                    identifier,
                    record.seq_num,
                    destination,
                    e
                );
                false
            }
        };

        Ok(SendOutcome {
            record,
            transmitted,
        })
    }

    fn piggyback_acks(&self, envelope: &mut Envelope, destination: &str) {
        for inbound in self.store.inbound_for_endpoint(destination) {
            let seq = inbound.lock();
            if seq.highest_received() == 0 {
                continue;
            }
            log::trace!(
                "[sequencer] piggybacking ack for {} to {}",
                seq.id(),
                destination
            );
            envelope.push_header(ack_header(&seq));
        }
    }
}

impl std::fmt::Debug for OutboundSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSequencer")
            .field("outbound_sequences", &self.store.outbound_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::URI_ANONYMOUS;
    use crate::retry::FixedInterval;
    use crate::sequence::AckRange;
    use crate::transport::MemoryTransport;
    use std::time::Duration;

    const DEST: &str = "http://server";

    struct Fixture {
        store: Arc<SequenceStore>,
        transport: Arc<MemoryTransport>,
        retry: Arc<RetryEngine>,
        sequencer: OutboundSequencer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SequenceStore::new());
        let transport = Arc::new(MemoryTransport::new());
        let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::new(1_000));
        let metrics = Arc::new(RmMetrics::new());
        let retry = Arc::new(RetryEngine::new(
            Arc::clone(&store),
            transport.clone(),
            Arc::clone(&clock),
            Box::new(FixedInterval::new(Duration::from_secs(20))),
            Arc::clone(&metrics),
            Duration::from_secs(3600),
        ));
        let sequencer = OutboundSequencer::new(
            Arc::clone(&store),
            transport.clone(),
            clock,
            Arc::new(IdGenerator::new()),
            metrics,
            Arc::clone(&retry),
        );
        Fixture {
            store,
            transport,
            retry,
            sequencer,
        }
    }

    #[test]
    fn test_send_decorates_and_records() {
        let f = fixture();
        let out = f
            .sequencer
            .send(SendRequest::new("s", DEST, URI_ANONYMOUS).with_body(b"hi".to_vec()))
            .expect("send");
        assert_eq!(out.message_number(), 1);
        assert!(out.transmitted);
        assert!(out.message_id().is_some_and(|m| m.starts_with("urn:messageID-")));

        let env = &f.transport.sent_to(DEST)[0];
        let seq = env.sequence().expect("sequence header");
        assert_eq!(seq.identifier.as_deref(), Some("s"));
        assert_eq!(seq.message_number, Some(1));
        assert!(!seq.last_message);
        assert_eq!(env.action(), Some(PING_URI));
        assert_eq!(env.from_address(), Some(Some(URI_ANONYMOUS)));
        assert_eq!(env.to(), Some(DEST));
        assert_eq!(env.body(), b"hi");

        let rec = f.store.outbound("s").expect("s");
        assert_eq!(rec.lock().in_flight_numbers(), vec![1]);
        assert_eq!(rec.lock().get(1).map(|r| r.last_sent_ms), Some(1_000));
        assert!(f.retry.is_running());
    }

    #[test]
    fn test_skip_and_last_message() {
        let f = fixture();
        f.sequencer
            .send(SendRequest::new("s", DEST, URI_ANONYMOUS))
            .expect("send");
        let out = f
            .sequencer
            .send(
                SendRequest::new("s", DEST, URI_ANONYMOUS)
                    .with_skip(true)
                    .with_last_message(true),
            )
            .expect("send");
        assert_eq!(out.message_number(), 3);
        assert_eq!(out.record.payload.sequence().map(|s| s.last_message), Some(true));

        let seq = f.store.outbound("s").expect("s");
        assert_eq!(seq.lock().last_message(), Some(3));
        assert_eq!(seq.lock().in_flight_numbers(), vec![1, 3]);
    }

    #[test]
    fn test_failed_first_transmission_keeps_record() {
        let f = fixture();
        f.transport.set_failing(true);
        let out = f
            .sequencer
            .send(SendRequest::new("s", DEST, URI_ANONYMOUS))
            .expect("send is not an error");
        assert!(!out.transmitted);
        assert_eq!(f.store.in_flight_total(), 1);
    }

    #[test]
    fn test_piggybacks_acks_for_matching_endpoint_only() {
        let f = fixture();
        for (id, ep) in [("in-a", DEST), ("in-b", "http://elsewhere")] {
            let seq = f.store.inbound_or_insert(id);
            let mut seq = seq.lock();
            seq.set_endpoint_if_unset(Some(ep));
            seq.on_receive(1);
            seq.on_receive(2);
        }
        f.store
            .inbound_or_insert("in-empty")
            .lock()
            .set_endpoint_if_unset(Some(DEST));

        f.sequencer
            .send(SendRequest::new("s", DEST, "http://me"))
            .expect("send");
        let env = &f.transport.sent_to(DEST)[0];
        let acks: Vec<_> = env.acks().collect();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].identifier.as_deref(), Some("in-a"));
        assert_eq!(acks[0].ranges, vec![AckRange::new(1, 2)]);
    }

    #[test]
    fn test_rejects_empty_identifier_or_destination() {
        let f = fixture();
        assert!(matches!(
            f.sequencer.send(SendRequest::new("", DEST, URI_ANONYMOUS)),
            Err(Error::MissingIdentifier)
        ));
        assert!(matches!(
            f.sequencer.send(SendRequest::new("s", "", URI_ANONYMOUS)),
            Err(Error::MissingAddress)
        ));
        assert_eq!(f.store.outbound_len(), 0);
    }
}
