// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signed token codecs.
//!
//! All tokens share one scheme: `base64url(json payload) + "." +
//! base64url(HMAC-SHA-256(base64url(json payload), secret))`. Refresh
//! tokens, access tokens, and the OAuth cookie attestations differ only in
//! payload shape and signing secret. The signature is verified in constant
//! time *before* the payload is decoded, so a tampered blob never reaches
//! deserialization or a store lookup.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vespid_crypto::{b64url_decode, b64url_encode, ct_eq, hmac_sha256, sha256_hex};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a token failed to verify or parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The blob is not two dot-separated base64url segments, or the payload
    /// is not the expected JSON shape.
    #[error("malformed token")]
    Malformed,

    /// The HMAC did not match.
    #[error("token signature mismatch")]
    BadSignature,

    /// The token is past its expiry instant.
    #[error("token expired")]
    Expired,
}

// ---------------------------------------------------------------------------
// Generic signed blob
// ---------------------------------------------------------------------------

/// Sign a serializable payload into a `payload.signature` blob.
pub fn sign_blob<T: Serialize>(payload: &T, secret: &[u8]) -> String {
    let body = b64url_encode(&serde_json::to_vec(payload).expect("payload serializes"));
    let mac = hmac_sha256(secret, body.as_bytes());
    format!("{body}.{}", b64url_encode(&mac))
}

/// Verify a `payload.signature` blob and decode the payload.
pub fn verify_blob<T: DeserializeOwned>(blob: &str, secret: &[u8]) -> Result<T, TokenError> {
    let (body, sig) = blob.split_once('.').ok_or(TokenError::Malformed)?;
    let claimed = b64url_decode(sig).map_err(|_| TokenError::Malformed)?;
    let expected = hmac_sha256(secret, body.as_bytes());
    if !ct_eq(&expected, &claimed) {
        return Err(TokenError::BadSignature);
    }
    let raw = b64url_decode(body).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)
}

// ---------------------------------------------------------------------------
// Refresh tokens
// ---------------------------------------------------------------------------

/// Payload of the long-lived refresh blob carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenPayload {
    /// Auth session row this token belongs to.
    pub session_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Rotates on every `/auth/refresh`; makes successive blobs distinct.
    pub token_nonce: String,
    /// Expiry as epoch seconds.
    pub expires_at: i64,
}

/// Sign a refresh-token payload.
pub fn sign_refresh_token(payload: &RefreshTokenPayload, secret: &[u8]) -> String {
    sign_blob(payload, secret)
}

/// Verify a refresh blob: signature first, then payload shape, then expiry.
pub fn verify_refresh_token(
    blob: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<RefreshTokenPayload, TokenError> {
    let payload: RefreshTokenPayload = verify_blob(blob, secret)?;
    if now.timestamp() >= payload.expires_at {
        return Err(TokenError::Expired);
    }
    Ok(payload)
}

/// SHA-256 hex of the whole blob; this is the verifier stored on the
/// session row, never the blob itself.
pub fn refresh_token_hash(blob: &str) -> String {
    sha256_hex(blob.as_bytes())
}

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

/// Payload of the short-lived bearer access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenPayload {
    /// Authenticated user.
    pub user_id: Uuid,
    /// User email at issue time (display convenience only).
    pub email: String,
    /// Auth session the token was minted from.
    pub session_id: Uuid,
    /// Expiry as epoch seconds.
    pub exp: i64,
}

/// Sign an access-token payload.
pub fn sign_access_token(payload: &AccessTokenPayload, secret: &[u8]) -> String {
    sign_blob(payload, secret)
}

/// Verify a bearer access token.
pub fn verify_access_token(
    blob: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<AccessTokenPayload, TokenError> {
    let payload: AccessTokenPayload = verify_blob(blob, secret)?;
    if now.timestamp() >= payload.exp {
        return Err(TokenError::Expired);
    }
    Ok(payload)
}

// ---------------------------------------------------------------------------
// Signed opaque ids (OAuth cookies)
// ---------------------------------------------------------------------------

/// A signed attestation of a single opaque id, with its own expiry.
///
/// Used for the OAuth `_state` and `_nonce` cookies, which must be
/// verifiable even when the in-memory state record is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedId {
    /// The attested value.
    pub id: String,
    /// Expiry as epoch seconds.
    pub exp: i64,
}

/// Sign an opaque id valid until `expires_at`.
pub fn sign_opaque_id(id: &str, expires_at: DateTime<Utc>, secret: &[u8]) -> String {
    sign_blob(
        &SignedId {
            id: id.to_owned(),
            exp: expires_at.timestamp(),
        },
        secret,
    )
}

/// Verify a signed opaque id and return the inner value.
pub fn verify_opaque_id(
    blob: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let signed: SignedId = verify_blob(blob, secret)?;
    if now.timestamp() >= signed.exp {
        return Err(TokenError::Expired);
    }
    Ok(signed.id)
}

// ---------------------------------------------------------------------------
// Prefixed tokens (invitations, pairing)
// ---------------------------------------------------------------------------

/// Split a `<uuid>.<opaque>` token into its UUID prefix and opaque tail.
///
/// Invitation tokens prefix the organization id; pairing tokens prefix the
/// pairing record id. The tail must be non-empty.
pub fn parse_prefixed_token(token: &str) -> Result<(Uuid, &str), TokenError> {
    let (prefix, tail) = token.split_once('.').ok_or(TokenError::Malformed)?;
    if tail.is_empty() {
        return Err(TokenError::Malformed);
    }
    let id = Uuid::parse_str(prefix).map_err(|_| TokenError::Malformed)?;
    Ok((id, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &[u8] = b"test-signing-secret";

    fn refresh_payload(expires_at: i64) -> RefreshTokenPayload {
        RefreshTokenPayload {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_nonce: "nonce-1".into(),
            expires_at,
        }
    }

    #[test]
    fn refresh_token_round_trips() {
        let now = Utc::now();
        let payload = refresh_payload((now + Duration::days(7)).timestamp());
        let blob = sign_refresh_token(&payload, SECRET);
        let verified = verify_refresh_token(&blob, SECRET, now).unwrap();
        assert_eq!(verified, payload);
    }

    #[test]
    fn tampered_payload_fails_signature_not_decode() {
        let now = Utc::now();
        let payload = refresh_payload((now + Duration::days(7)).timestamp());
        let blob = sign_refresh_token(&payload, SECRET);
        let (body, sig) = blob.split_once('.').unwrap();
        // Flip one payload character while keeping the original signature.
        let mut chars: Vec<char> = body.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect::<String>() + "." + sig;
        assert_eq!(
            verify_refresh_token(&tampered, SECRET, now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let payload = refresh_payload((now + Duration::days(7)).timestamp());
        let blob = sign_refresh_token(&payload, SECRET);
        assert_eq!(
            verify_refresh_token(&blob, b"other-secret", now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn expired_refresh_token_is_rejected() {
        let now = Utc::now();
        let payload = refresh_payload((now - Duration::seconds(1)).timestamp());
        let blob = sign_refresh_token(&payload, SECRET);
        assert_eq!(
            verify_refresh_token(&blob, SECRET, now),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn refresh_hash_is_stable_per_blob() {
        let now = Utc::now();
        let payload = refresh_payload((now + Duration::days(7)).timestamp());
        let blob = sign_refresh_token(&payload, SECRET);
        assert_eq!(refresh_token_hash(&blob), refresh_token_hash(&blob));
        assert_eq!(refresh_token_hash(&blob).len(), 64);
    }

    #[test]
    fn access_token_round_trips_and_expires() {
        let now = Utc::now();
        let payload = AccessTokenPayload {
            user_id: Uuid::new_v4(),
            email: "a@b.co".into(),
            session_id: Uuid::new_v4(),
            exp: (now + Duration::minutes(15)).timestamp(),
        };
        let blob = sign_access_token(&payload, SECRET);
        assert_eq!(verify_access_token(&blob, SECRET, now).unwrap(), payload);
        let later = now + Duration::minutes(16);
        assert_eq!(
            verify_access_token(&blob, SECRET, later),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn opaque_id_round_trips() {
        let now = Utc::now();
        let blob = sign_opaque_id("state-abc", now + Duration::minutes(10), SECRET);
        assert_eq!(verify_opaque_id(&blob, SECRET, now).unwrap(), "state-abc");
    }

    #[test]
    fn prefixed_token_parses_uuid_and_tail() {
        let org = Uuid::new_v4();
        let token = format!("{org}.abc123");
        let (id, tail) = parse_prefixed_token(&token).unwrap();
        assert_eq!(id, org);
        assert_eq!(tail, "abc123");
    }

    #[test]
    fn prefixed_token_rejects_bad_shapes() {
        assert_eq!(
            parse_prefixed_token("no-dot-here"),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            parse_prefixed_token("not-a-uuid.tail"),
            Err(TokenError::Malformed)
        );
        let org = Uuid::new_v4();
        assert_eq!(
            parse_prefixed_token(&format!("{org}.")),
            Err(TokenError::Malformed)
        );
    }

    proptest::proptest! {
        #[test]
        fn verify_never_panics_on_arbitrary_input(blob in "[ -~]{0,120}") {
            let _ = verify_blob::<RefreshTokenPayload>(&blob, SECRET);
        }
    }
}
