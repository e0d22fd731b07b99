// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cryptographic primitives for the Vespid control plane.
//!
//! Everything here is deliberately small and synchronous: HMAC signing for
//! token blobs, constant-time comparison, SHA-256 digests, random token
//! material, base64url codecs, Argon2id password hashing, and the AES-GCM
//! envelope scheme used by the secret vault (a fresh DEK per secret, sealed
//! under the process KEK).
//!
//! No other crate in the workspace touches key material directly.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod password;

pub use envelope::{EnvelopeKey, SealedBox, WrappedSecret, envelope_open, envelope_seal};
pub use password::{hash_password, random_password_hash, verify_password};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by the primitives in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Input was not valid base64url.
    #[error("invalid base64url input")]
    InvalidBase64,

    /// A key had the wrong length for the requested operation.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required key size in bytes.
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },

    /// AEAD open failed (wrong key, tampered ciphertext, or wrong nonce).
    #[error("ciphertext authentication failed")]
    OpenFailed,

    /// Password hashing backend failed.
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

// ---------------------------------------------------------------------------
// base64url
// ---------------------------------------------------------------------------

/// Encode bytes as unpadded base64url.
pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url string.
pub fn b64url_decode(data: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|_| CryptoError::InvalidBase64)
}

// ---------------------------------------------------------------------------
// Digests and MACs
// ---------------------------------------------------------------------------

/// Raw SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// HMAC-SHA-256 of `data` under `key`.
///
/// HMAC accepts keys of any length, so this cannot fail.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time equality over byte slices.
///
/// Length is compared first; unequal lengths return `false` without touching
/// the contents, which leaks only the length (already public for all our
/// token formats).
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Random material
// ---------------------------------------------------------------------------

/// `n` cryptographically random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// An opaque URL-safe random token with `n` bytes of entropy.
pub fn random_token(n: usize) -> String {
    b64url_encode(&random_bytes(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn b64url_round_trips() {
        let data = b"vespid control plane";
        let encoded = b64url_encode(data);
        assert!(!encoded.contains('='));
        assert_eq!(b64url_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn b64url_rejects_invalid_input() {
        assert!(matches!(
            b64url_decode("not valid!!"),
            Err(CryptoError::InvalidBase64)
        ));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA-256("abc"), FIPS 180-2 appendix B.1.
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_is_deterministic_and_key_dependent() {
        let a = hmac_sha256(b"key-one", b"payload");
        let b = hmac_sha256(b"key-one", b"payload");
        let c = hmac_sha256(b"key-two", b"payload");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ct_eq_compares_correctly() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"diff"));
        assert!(!ct_eq(b"short", b"longer-input"));
    }

    #[test]
    fn random_tokens_are_unique() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn b64url_round_trips_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = b64url_encode(&data);
            prop_assert_eq!(b64url_decode(&encoded).unwrap(), data);
        }
    }
}
