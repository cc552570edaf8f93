//! Provider webhook signature verification using HMAC-SHA256.
//!
//! The provider signs `"{timestamp}.{raw body}"` with the shared secret and
//! sends `mux-signature: t=<unix seconds>,v1=<hex hmac>`. A delivery is
//! trusted only if the MAC matches and the timestamp is within the
//! freshness window, which defeats replay of captured deliveries.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::webhook::{RejectReason, Verification, WebhookEnvelope};

type HmacSha256 = Hmac<Sha256>;

impl WebhookEnvelope {
    /// Build an envelope from the raw body and the signature header value.
    ///
    /// Accepts the parts in any order and ignores unknown keys. Returns
    /// `Malformed` if the timestamp or `v1` signature is missing or invalid.
    pub fn from_header(payload: impl Into<Vec<u8>>, header: &str) -> Result<Self, RejectReason> {
        let mut timestamp = None;
        let mut signature = None;

        for element in header.split(',') {
            let Some((key, value)) = element.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = value.trim().parse::<i64>().ok(),
                "v1" => signature = Some(value.trim().to_string()),
                _ => {}
            }
        }

        match (timestamp, signature) {
            (Some(timestamp), Some(signature)) if !signature.is_empty() => Ok(Self {
                payload: payload.into(),
                signature,
                timestamp,
            }),
            _ => Err(RejectReason::Malformed),
        }
    }
}

/// Checks envelopes against one shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Verify against the system clock.
    pub fn verify(&self, envelope: &WebhookEnvelope) -> Verification {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.verify_at(envelope, now)
    }

    /// Verify as if the current time were `now` (unix seconds).
    pub fn verify_at(&self, envelope: &WebhookEnvelope, now: i64) -> Verification {
        let Ok(provided) = hex::decode(&envelope.signature) else {
            return Verification::Rejected(RejectReason::Malformed);
        };

        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Verification::Rejected(RejectReason::Malformed),
        };
        mac.update(envelope.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(&envelope.payload);

        // Constant-time comparison via the HMAC library
        if mac.verify_slice(&provided).is_err() {
            return Verification::Rejected(RejectReason::BadSignature);
        }

        let age = now.abs_diff(envelope.timestamp);
        if age > self.tolerance.as_secs() {
            return Verification::Rejected(RejectReason::Stale);
        }

        Verification::Verified(envelope.payload.clone())
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

/// Computes the signature the provider would send for `payload` at `timestamp`.
pub fn compute_signature(payload: &[u8], timestamp: i64, secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature header value: `t=<timestamp>,v1=<hex>`.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!("t={},v1={}", timestamp, hex::encode(signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier(secret: &str) -> WebhookVerifier {
        WebhookVerifier::new(secret, Duration::from_secs(300))
    }

    fn signed(payload: &[u8], timestamp: i64, secret: &str) -> WebhookEnvelope {
        let sig = compute_signature(payload, timestamp, secret.as_bytes());
        WebhookEnvelope::from_header(payload.to_vec(), &format_signature_header(timestamp, &sig))
            .unwrap()
    }

    #[test]
    fn test_fresh_signed_payload_is_verified() {
        let payload = br#"{"status":"ready"}"#;
        let envelope = signed(payload, NOW, "abc");

        match verifier("abc").verify_at(&envelope, NOW) {
            Verification::Verified(body) => assert_eq!(body, payload.to_vec()),
            other => panic!("expected Verified, got {:?}", other),
        }
    }

    #[test]
    fn test_signature_from_other_secret_is_rejected() {
        let envelope = signed(br#"{"status":"ready"}"#, NOW, "not-abc");
        assert_eq!(
            verifier("abc").verify_at(&envelope, NOW),
            Verification::Rejected(RejectReason::BadSignature)
        );
    }

    #[test]
    fn test_tampered_byte_is_rejected() {
        let mut envelope = signed(br#"{"status":"ready"}"#, NOW, "abc");
        envelope.payload[3] ^= 0x01;
        assert_eq!(
            verifier("abc").verify_at(&envelope, NOW),
            Verification::Rejected(RejectReason::BadSignature)
        );
    }

    #[test]
    fn test_tampered_timestamp_is_rejected() {
        let mut envelope = signed(b"{}", NOW, "abc");
        envelope.timestamp += 1;
        assert_eq!(
            verifier("abc").verify_at(&envelope, NOW),
            Verification::Rejected(RejectReason::BadSignature)
        );
    }

    #[test]
    fn test_old_payload_is_stale() {
        let envelope = signed(b"{}", NOW - 301, "abc");
        assert_eq!(
            verifier("abc").verify_at(&envelope, NOW),
            Verification::Rejected(RejectReason::Stale)
        );

        let edge = signed(b"{}", NOW - 300, "abc");
        assert!(verifier("abc").verify_at(&edge, NOW).is_verified());
    }

    #[test]
    fn test_far_future_payload_is_stale() {
        let envelope = signed(b"{}", NOW + 3600, "abc");
        assert_eq!(
            verifier("abc").verify_at(&envelope, NOW),
            Verification::Rejected(RejectReason::Stale)
        );
    }

    #[test]
    fn test_system_clock_verification() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let envelope = signed(b"{}", now, "abc");
        assert!(verifier("abc").verify(&envelope).is_verified());
    }

    #[test]
    fn test_malformed_headers() {
        for header in ["", "t=123", "v1=abcd", "t=abc,v1=abcd", "t=123,v1=", "garbage"] {
            assert_eq!(
                WebhookEnvelope::from_header(b"{}".to_vec(), header),
                Err(RejectReason::Malformed),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_header_parsing_is_order_independent() {
        let envelope = WebhookEnvelope::from_header(b"{}".to_vec(), " v1=ab12 , t=42 , v0=ff").unwrap();
        assert_eq!(envelope.timestamp, 42);
        assert_eq!(envelope.signature, "ab12");
    }

    #[test]
    fn test_non_hex_signature_is_malformed() {
        let envelope = WebhookEnvelope::from_header(b"{}".to_vec(), &format!("t={},v1=zzzz", NOW)).unwrap();
        assert_eq!(
            verifier("abc").verify_at(&envelope, NOW),
            Verification::Rejected(RejectReason::Malformed)
        );
    }

    proptest! {
        #[test]
        fn prop_modified_payload_fails(original: Vec<u8>, modified: Vec<u8>, secret in "[a-z]{1,16}") {
            prop_assume!(original != modified);
            let sig = compute_signature(&original, NOW, secret.as_bytes());
            let envelope = WebhookEnvelope {
                payload: modified,
                signature: hex::encode(sig),
                timestamp: NOW,
            };
            prop_assert_eq!(
                verifier(&secret).verify_at(&envelope, NOW),
                Verification::Rejected(RejectReason::BadSignature)
            );
        }

        #[test]
        fn prop_malformed_header_no_panic(header: String, payload: Vec<u8>) {
            if let Ok(envelope) = WebhookEnvelope::from_header(payload, &header) {
                let _ = verifier("abc").verify_at(&envelope, NOW);
            }
        }
    }
}
