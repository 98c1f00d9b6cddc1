// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Envelope model exchanged with the message-handling layer.
//!
//! The engine never renders or parses XML. The surrounding layer extracts
//! the protocol headers into [`Header`] values and renders the ones the
//! engine adds. The body is opaque.
//!
//! Fields that the wire format allows to be absent (`Identifier`,
//! `MessageNumber`, the `Address` inside `From`) are `Option`s here so the
//! engine can report them as protocol violations.

use crate::sequence::AckRange;

/// `Sequence` header block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceHeader {
    pub identifier: Option<String>,
    pub message_number: Option<u64>,
    /// `LastMessage` marker present.
    pub last_message: bool,
}

impl SequenceHeader {
    /// Well-formed header for message `n` of sequence `identifier`.
    pub fn new(identifier: impl Into<String>, n: u64) -> Self {
        Self {
            identifier: Some(identifier.into()),
            message_number: Some(n),
            last_message: false,
        }
    }

    pub fn with_last_message(mut self, last: bool) -> Self {
        self.last_message = last;
        self
    }
}

/// `SequenceAcknowledgement` header block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckHeader {
    pub identifier: Option<String>,
    /// Ranges in wire order.
    pub ranges: Vec<AckRange>,
}

impl AckHeader {
    pub fn new(identifier: impl Into<String>, ranges: Vec<AckRange>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ranges,
        }
    }
}

/// Header kinds, used to query and mark blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Sequence,
    SequenceAcknowledgement,
    Action,
    From,
    To,
    MessageId,
}

/// One protocol header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Sequence(SequenceHeader),
    SequenceAcknowledgement(AckHeader),
    Action(String),
    /// Reply-to endpoint; `None` when the `From` block has no `Address`.
    From(Option<String>),
    To(String),
    MessageId(String),
}

impl Header {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Header::Sequence(_) => HeaderKind::Sequence,
            Header::SequenceAcknowledgement(_) => HeaderKind::SequenceAcknowledgement,
            Header::Action(_) => HeaderKind::Action,
            Header::From(_) => HeaderKind::From,
            Header::To(_) => HeaderKind::To,
            Header::MessageId(_) => HeaderKind::MessageId,
        }
    }
}

/// Header block plus its processed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub header: Header,
    pub processed: bool,
}

/// Opaque message envelope: ordered header blocks and a body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    headers: Vec<HeaderBlock>,
    body: Vec<u8>,
}

impl Envelope {
    /// Empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder-style header append.
    pub fn with_header(mut self, header: Header) -> Self {
        self.push_header(header);
        self
    }

    pub fn push_header(&mut self, header: Header) {
        self.headers.push(HeaderBlock {
            header,
            processed: false,
        });
    }

    /// Replace every block of the same kind with `header`.
    ///
    /// Used for the single-valued addressing headers (`Action`, `To`, ...).
    pub fn set_header(&mut self, header: Header) {
        let kind = header.kind();
        self.headers.retain(|b| b.header.kind() != kind);
        self.push_header(header);
    }

    pub fn headers(&self) -> &[HeaderBlock] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    fn first(&self, kind: HeaderKind) -> Option<&Header> {
        self.headers
            .iter()
            .map(|b| &b.header)
            .find(|h| h.kind() == kind)
    }

    /// First `Sequence` header.
    pub fn sequence(&self) -> Option<&SequenceHeader> {
        match self.first(HeaderKind::Sequence) {
            Some(Header::Sequence(s)) => Some(s),
            _ => None,
        }
    }

    /// Every `SequenceAcknowledgement` header, in order.
    pub fn acks(&self) -> impl Iterator<Item = &AckHeader> {
        self.headers.iter().filter_map(|b| match &b.header {
            Header::SequenceAcknowledgement(a) => Some(a),
            _ => None,
        })
    }

    pub fn action(&self) -> Option<&str> {
        match self.first(HeaderKind::Action) {
            Some(Header::Action(a)) => Some(a),
            _ => None,
        }
    }

    /// `From` header: `None` if absent, `Some(None)` if present without an
    /// address.
    pub fn from_address(&self) -> Option<Option<&str>> {
        match self.first(HeaderKind::From) {
            Some(Header::From(addr)) => Some(addr.as_deref()),
            _ => None,
        }
    }

    pub fn to(&self) -> Option<&str> {
        match self.first(HeaderKind::To) {
            Some(Header::To(t)) => Some(t),
            _ => None,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self.first(HeaderKind::MessageId) {
            Some(Header::MessageId(m)) => Some(m),
            _ => None,
        }
    }

    /// Mark every block of `kind` as processed.
    pub fn mark_processed(&mut self, kind: HeaderKind) {
        for block in self.headers.iter_mut().filter(|b| b.header.kind() == kind) {
            block.processed = true;
        }
    }

    /// True if at least one block of `kind` exists and all are processed.
    pub fn is_processed(&self, kind: HeaderKind) -> bool {
        let mut blocks = self
            .headers
            .iter()
            .filter(|b| b.header.kind() == kind)
            .peekable();
        blocks.peek().is_some() && blocks.all(|b| b.processed)
    }
}
