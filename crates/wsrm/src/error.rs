// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the reliable-messaging engine.
//!
//! Errors fall into three families:
//!
//! - **Protocol violations** are hard failures. The enclosing message-handling
//!   layer turns them into a fault response using [`Error::fault_code`].
//! - **Transmission failures** never leave the background loops; they are
//!   logged and covered by the next retry or ack trigger. The variant exists so
//!   that [`crate::Transport`] implementations have something to return.
//! - **Configuration / lifecycle** errors come from config loading and from
//!   calls made after shutdown.

use crate::config::{FAULT_GENERIC, FAULT_NO_ADDRESS, FAULT_UNKNOWN_SEQUENCE};

/// Error type for all fallible engine operations.
///
/// # Example
///
/// ```rust
/// use wsrm::{AckRange, Error, SequenceStore};
/// use wsrm::applier::AckApplier;
/// use std::sync::Arc;
///
/// let applier = AckApplier::new(Arc::new(SequenceStore::new()));
/// match applier.apply_ack("urn:identifier-unknown", &[AckRange::new(1, 3)]) {
///     Err(Error::UnknownSequence(id)) => assert_eq!(id, "urn:identifier-unknown"),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Violations
    // ========================================================================
    /// A Sequence or SequenceAcknowledgement header carried no Identifier.
    MissingIdentifier,
    /// A Sequence header carried no MessageNumber.
    MissingMessageNumber,
    /// Message numbers start at 1.
    InvalidMessageNumber(u64),
    /// A From header carried no Address.
    MissingAddress,
    /// The peer acknowledged a sequence this sender never created.
    UnknownSequence(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// One-way send to the destination failed.
    SendFailed(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration value out of range.
    InvalidConfig(String),
    /// Configuration file not found at specified path.
    ConfigFileNotFound(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The engine (or one of its services) has been shut down.
    ShutDown,
}

impl Error {
    /// True for errors the peer caused; these abort processing of the
    /// offending message with an explicit fault.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::MissingIdentifier
                | Error::MissingMessageNumber
                | Error::InvalidMessageNumber(_)
                | Error::MissingAddress
                | Error::UnknownSequence(_)
        )
    }

    /// Fault code for the transport-level fault response, if this is a
    /// protocol violation.
    pub fn fault_code(&self) -> Option<&'static str> {
        match self {
            Error::MissingIdentifier
            | Error::MissingMessageNumber
            | Error::InvalidMessageNumber(_) => Some(FAULT_GENERIC),
            Error::MissingAddress => Some(FAULT_NO_ADDRESS),
            Error::UnknownSequence(_) => Some(FAULT_UNKNOWN_SEQUENCE),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Protocol
            Error::MissingIdentifier => write!(f, "Missing identifier in Sequence"),
            Error::MissingMessageNumber => write!(f, "Missing message number in Sequence"),
            Error::InvalidMessageNumber(n) => {
                write!(f, "Invalid message number: {} (must be >= 1)", n)
            }
            Error::MissingAddress => write!(f, "No <Address> element in <From> header"),
            Error::UnknownSequence(id) => write!(f, "Don't recognize ack of sequence '{}'", id),
            // Transport
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            // Configuration
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ConfigFileNotFound(path) => write!(f, "Config file not found: {}", path),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            // Lifecycle
            Error::ShutDown => write!(f, "Engine has been shut down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Convenient alias for results using the crate `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
