//! Inbound provider webhooks.
//!
//! # Data Flow
//! ```text
//! POST /webhooks/video (raw body + mux-signature header)
//!     → WebhookEnvelope::from_header
//!     → WebhookVerifier::verify (HMAC-SHA256, freshness window)
//!     → VideoEvent::parse
//!     → AssetStore::apply_event
//! ```
//!
//! Nothing from a payload is applied unless it is `Verified` and parses.

pub mod events;
pub mod signature;

use std::fmt;

pub use events::VideoEvent;
pub use signature::{compute_signature, format_signature_header, WebhookVerifier};

/// Header carrying `t=<unix seconds>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "mux-signature";

/// A signed inbound delivery, before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    pub payload: Vec<u8>,
    /// Hex-encoded HMAC as sent by the provider.
    pub signature: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Why a delivery was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSignature,
    Stale,
    Malformed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BadSignature => "bad_signature",
            RejectReason::Stale => "stale",
            RejectReason::Malformed => "malformed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Carries the trusted payload bytes.
    Verified(Vec<u8>),
    Rejected(RejectReason),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified(_))
    }
}
