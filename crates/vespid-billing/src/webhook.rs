// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stripe-style webhook signature verification.
//!
//! The header is `t=<epoch>,v1=<hex hmac>[,v1=...]`; the signed payload is
//! `"{t}.{raw body}"`. Verification is constant-time over each candidate
//! signature, and the timestamp must be within the replay tolerance.

use chrono::{DateTime, Utc};
use vespid_crypto::{ct_eq, hmac_sha256};

/// Default replay tolerance in seconds.
pub const DEFAULT_TOLERANCE_SEC: i64 = 300;

/// Signature verification failures; all map to a 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The header was missing a `t=` or `v1=` component.
    #[error("malformed signature header")]
    Malformed,
    /// The timestamp is outside the replay tolerance.
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfRange,
    /// No candidate signature matched.
    #[error("signature mismatch")]
    Mismatch,
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Verify a webhook signature header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_sec: i64,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse().ok();
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now.timestamp() - timestamp).abs() > tolerance_sec {
        return Err(SignatureError::TimestampOutOfRange);
    }

    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);
    let expected = hex_encode(&hmac_sha256(secret.as_bytes(), &signed));
    if candidates
        .iter()
        .any(|candidate| ct_eq(expected.as_bytes(), candidate.as_bytes()))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a valid signature header (used by tests and the local simulator).
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);
    let mac = hex_encode(&hmac_sha256(secret.as_bytes(), &signed));
    format!("t={timestamp},v1={mac}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_testsecret";

    #[test]
    fn valid_signature_passes() {
        let now = Utc::now();
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_payload(payload, SECRET, now.timestamp());
        assert_eq!(
            verify_signature(payload, &header, SECRET, DEFAULT_TOLERANCE_SEC, now),
            Ok(())
        );
    }

    #[test]
    fn wrong_secret_fails() {
        let now = Utc::now();
        let payload = b"{}";
        let header = sign_payload(payload, "whsec_other", now.timestamp());
        assert_eq!(
            verify_signature(payload, &header, SECRET, DEFAULT_TOLERANCE_SEC, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn tampered_payload_fails() {
        let now = Utc::now();
        let header = sign_payload(b"{\"credits\":100}", SECRET, now.timestamp());
        assert_eq!(
            verify_signature(b"{\"credits\":999}", &header, SECRET, DEFAULT_TOLERANCE_SEC, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_fails() {
        let now = Utc::now();
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, now.timestamp() - 600);
        assert_eq!(
            verify_signature(payload, &header, SECRET, DEFAULT_TOLERANCE_SEC, now),
            Err(SignatureError::TimestampOutOfRange)
        );
    }

    #[test]
    fn malformed_headers_fail() {
        let now = Utc::now();
        for header in ["", "t=abc", "v1=deadbeef", "t=,v1="] {
            assert!(verify_signature(b"{}", header, SECRET, DEFAULT_TOLERANCE_SEC, now).is_err());
        }
    }

    #[test]
    fn any_matching_v1_candidate_passes() {
        let now = Utc::now();
        let payload = b"{}";
        let good = sign_payload(payload, SECRET, now.timestamp());
        let header = format!("{good},v1=0000000000000000");
        assert_eq!(
            verify_signature(payload, &header, SECRET, DEFAULT_TOLERANCE_SEC, now),
            Ok(())
        );
    }
}
