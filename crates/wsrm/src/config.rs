// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration - single source of truth for protocol constants.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: Compile-time constants (namespaces, action URIs,
//!   fault codes, timing defaults)
//! - **Level 2 (Dynamic)**: [`RmConfig`] for runtime tuning, optionally loaded
//!   from YAML with the `config-loaders` feature
//!
//! # Example
//!
//! ```ignore
//! use wsrm::config::*;
//! use std::time::Duration;
//!
//! let cfg = RmConfig::default()
//!     .with_retry_threshold(Duration::from_secs(5))
//!     .with_ack_coalesce_delay(Duration::from_millis(500));
//! cfg.validate()?;
//! ```

use std::time::Duration;

use crate::{Error, Result};

// =======================================================================
// Protocol URIs (WS-ReliableMessaging 2003/03)
// =======================================================================

/// Reply-to sentinel meaning "acknowledge on the same exchange".
pub const URI_ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2003/03/addressing/role/anonymous";

/// Default action stamped on application messages.
pub const PING_URI: &str = "urn:wsrm:Ping";

/// Action stamped on acknowledgement messages.
pub const URI_ACK: &str = "http://schemas.xmlsoap.org/ws/2003/03/rm#SequenceAcknowledgement";

// =======================================================================
// Fault Codes
// =======================================================================

/// Generic protocol fault (malformed Sequence header).
pub const FAULT_GENERIC: &str = "WSRM.Fault";

/// Ack received for a sequence this sender never created.
pub const FAULT_UNKNOWN_SEQUENCE: &str = "WSRM.UnknownSequence";

/// From header without an Address.
pub const FAULT_NO_ADDRESS: &str = "WSRM.NoAddress";

// =======================================================================
// Identifier Prefixes
// =======================================================================

/// Prefix for minted sequence identifiers.
pub const IDENTIFIER_URN_PREFIX: &str = "urn:identifier-";

/// Prefix for minted message ids.
pub const MESSAGE_ID_URN_PREFIX: &str = "urn:messageID-";

// =======================================================================
// Timing Defaults
// =======================================================================

/// Retry scan period (milliseconds)
///
/// The retry loop wakes up this often and scans every outbound sequence.
pub const RETRY_SCAN_PERIOD_MS: u64 = 3_000;

/// Retry threshold (milliseconds)
///
/// A message unacknowledged for longer than this is resent.
pub const RETRY_THRESHOLD_MS: u64 = 20_000;

/// Ack coalescing delay (milliseconds)
///
/// Deferred acks become visible to the ack worker only after this delay, so
/// several inbound messages for the same sequence share one outgoing ack.
pub const ACK_COALESCE_DELAY_MS: u64 = 10_000;

/// Ack worker tick (milliseconds)
///
/// Upper bound on how long the ack worker blocks before re-reading the clock.
pub const ACK_WORKER_TICK_MS: u64 = 100;

/// Default backoff ceiling for the exponential retry policy (milliseconds).
pub const RETRY_MAX_THRESHOLD_MS: u64 = 320_000;

// =======================================================================
// Runtime Configuration
// =======================================================================

/// Retransmission strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicyKind {
    /// Resend every `retry_threshold`, forever (baseline behavior).
    Fixed,
    /// Double the threshold after every resend up to `max_threshold`, and give
    /// up after `max_attempts` retransmissions.
    Exponential {
        max_threshold: Duration,
        max_attempts: u32,
    },
}

/// Runtime configuration for [`crate::RmEngine`].
#[derive(Debug, Clone)]
pub struct RmConfig {
    /// How often the retry loop scans outbound sequences.
    pub retry_scan_period: Duration,
    /// Age after which an unacknowledged message is resent.
    pub retry_threshold: Duration,
    /// Retransmission strategy.
    pub retry_policy: RetryPolicyKind,
    /// Delay before a deferred ack becomes visible to the ack worker.
    pub ack_coalesce_delay: Duration,
    /// Maximum time the ack worker blocks before re-reading the clock.
    pub ack_worker_tick: Duration,
}

impl Default for RmConfig {
    fn default() -> Self {
        Self {
            retry_scan_period: Duration::from_millis(RETRY_SCAN_PERIOD_MS),
            retry_threshold: Duration::from_millis(RETRY_THRESHOLD_MS),
            retry_policy: RetryPolicyKind::Fixed,
            ack_coalesce_delay: Duration::from_millis(ACK_COALESCE_DELAY_MS),
            ack_worker_tick: Duration::from_millis(ACK_WORKER_TICK_MS),
        }
    }
}

impl RmConfig {
    /// Set the retry scan period.
    pub fn with_retry_scan_period(mut self, period: Duration) -> Self {
        self.retry_scan_period = period;
        self
    }

    /// Set the retry threshold.
    pub fn with_retry_threshold(mut self, threshold: Duration) -> Self {
        self.retry_threshold = threshold;
        self
    }

    /// Set the retransmission strategy.
    pub fn with_retry_policy(mut self, policy: RetryPolicyKind) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the ack coalescing delay.
    pub fn with_ack_coalesce_delay(mut self, delay: Duration) -> Self {
        self.ack_coalesce_delay = delay;
        self
    }

    /// Set the ack worker tick.
    pub fn with_ack_worker_tick(mut self, tick: Duration) -> Self {
        self.ack_worker_tick = tick;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.retry_scan_period.is_zero() {
            return Err(Error::InvalidConfig(
                "retry_scan_period must be non-zero".into(),
            ));
        }
        if self.ack_worker_tick.is_zero() {
            return Err(Error::InvalidConfig("ack_worker_tick must be non-zero".into()));
        }
        if let RetryPolicyKind::Exponential {
            max_threshold,
            max_attempts,
        } = self.retry_policy
        {
            if max_threshold < self.retry_threshold {
                return Err(Error::InvalidConfig(format!(
                    "max_threshold ({:?}) below retry_threshold ({:?})",
                    max_threshold, self.retry_threshold
                )));
            }
            if max_attempts == 0 {
                return Err(Error::InvalidConfig("max_attempts must be >= 1".into()));
            }
        }
        Ok(())
    }
}

// =======================================================================
// YAML Loader
// =======================================================================

#[cfg(feature = "config-loaders")]
mod yaml {
    //! YAML configuration loader.
    //!
    //! ```yaml
    //! retry:
    //!   scan_period_ms: 3000
    //!   threshold_ms: 20000
    //!   policy: exponential      # or "fixed"
    //!   max_threshold_ms: 320000
    //!   max_attempts: 8
    //! ack:
    //!   coalesce_delay_ms: 10000
    //!   worker_tick_ms: 100
    //! ```

    use serde::Deserialize;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use super::{RetryPolicyKind, RmConfig, RETRY_MAX_THRESHOLD_MS};
    use crate::{Error, Result};

    /// Root YAML document.
    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct YamlRmDocument {
        retry: YamlRetry,
        ack: YamlAck,
    }

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct YamlRetry {
        scan_period_ms: Option<u64>,
        threshold_ms: Option<u64>,
        policy: Option<String>,
        max_threshold_ms: Option<u64>,
        max_attempts: Option<u32>,
    }

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct YamlAck {
        coalesce_delay_ms: Option<u64>,
        worker_tick_ms: Option<u64>,
    }

    impl RmConfig {
        /// Parse a YAML document; absent keys keep their defaults.
        pub fn from_yaml_str(text: &str) -> Result<Self> {
            let doc: YamlRmDocument = serde_yaml::from_str(text)
                .map_err(|e| Error::InvalidConfig(format!("YAML parse error: {}", e)))?;

            let mut cfg = RmConfig::default();
            if let Some(ms) = doc.retry.scan_period_ms {
                cfg.retry_scan_period = Duration::from_millis(ms);
            }
            if let Some(ms) = doc.retry.threshold_ms {
                cfg.retry_threshold = Duration::from_millis(ms);
            }
            cfg.retry_policy = match doc.retry.policy.as_deref() {
                None | Some("fixed") | Some("FIXED") => RetryPolicyKind::Fixed,
                Some("exponential") | Some("EXPONENTIAL") => RetryPolicyKind::Exponential {
                    max_threshold: Duration::from_millis(
                        doc.retry.max_threshold_ms.unwrap_or(RETRY_MAX_THRESHOLD_MS),
                    ),
                    max_attempts: doc.retry.max_attempts.unwrap_or(8),
                },
                Some(other) => {
                    return Err(Error::InvalidConfig(format!(
                        "unknown retry policy '{}'",
                        other
                    )))
                }
            };
            if let Some(ms) = doc.ack.coalesce_delay_ms {
                cfg.ack_coalesce_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = doc.ack.worker_tick_ms {
                cfg.ack_worker_tick = Duration::from_millis(ms);
            }

            cfg.validate()?;
            Ok(cfg)
        }

        /// Load configuration from a YAML file.
        pub fn load_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref();
            if !path.exists() {
                return Err(Error::ConfigFileNotFound(path.display().to_string()));
            }
            let text = fs::read_to_string(path)?;
            Self::from_yaml_str(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_timings() {
        let cfg = RmConfig::default();
        assert_eq!(cfg.retry_scan_period, Duration::from_secs(3));
        assert_eq!(cfg.retry_threshold, Duration::from_secs(20));
        assert_eq!(cfg.ack_coalesce_delay, Duration::from_secs(10));
        assert_eq!(cfg.retry_policy, RetryPolicyKind::Fixed);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_scan_period() {
        let cfg = RmConfig::default().with_retry_scan_period(Duration::ZERO);
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_backoff_ceiling_below_threshold() {
        let cfg = RmConfig::default().with_retry_policy(RetryPolicyKind::Exponential {
            max_threshold: Duration::from_secs(1),
            max_attempts: 3,
        });
        assert!(cfg.validate().is_err());
    }

    #[cfg(feature = "config-loaders")]
    #[test]
    fn test_yaml_partial_document_keeps_defaults() {
        let cfg = RmConfig::from_yaml_str("ack:\n  coalesce_delay_ms: 250\n").expect("parse");
        assert_eq!(cfg.ack_coalesce_delay, Duration::from_millis(250));
        assert_eq!(cfg.retry_threshold, Duration::from_secs(20));
    }

    #[cfg(feature = "config-loaders")]
    #[test]
    fn test_yaml_exponential_policy() {
        let text = "retry:\n  threshold_ms: 1000\n  policy: exponential\n  max_threshold_ms: 8000\n  max_attempts: 4\n";
        let cfg = RmConfig::from_yaml_str(text).expect("parse");
        assert_eq!(
            cfg.retry_policy,
            RetryPolicyKind::Exponential {
                max_threshold: Duration::from_secs(8),
                max_attempts: 4,
            }
        );
    }

    #[cfg(feature = "config-loaders")]
    #[test]
    fn test_yaml_unknown_policy_is_rejected() {
        let err = RmConfig::from_yaml_str("retry:\n  policy: random\n").unwrap_err();
        assert!(err.to_string().contains("unknown retry policy"));
    }
}
