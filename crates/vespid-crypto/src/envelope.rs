// SPDX-License-Identifier: MIT OR Apache-2.0
//! AES-256-GCM envelope encryption.
//!
//! Each secret gets a fresh 32-byte DEK; the payload is sealed under the DEK
//! and the DEK itself is sealed under the long-lived KEK. Only the wrapped
//! form ([`WrappedSecret`]) is ever persisted.

use crate::{CryptoError, random_bytes};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

/// AES-GCM nonce size in bytes.
const IV_LEN: usize = 12;
/// AES-GCM authentication tag size in bytes.
const TAG_LEN: usize = 16;
/// DEK and KEK size in bytes (AES-256).
const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// EnvelopeKey
// ---------------------------------------------------------------------------

/// A key-encryption key with its stable identifier.
///
/// Loaded once at startup from configuration; `id` is persisted alongside
/// every secret sealed under it so rotation can tell old wraps apart.
#[derive(Clone)]
pub struct EnvelopeKey {
    /// Stable identifier recorded on every wrap.
    pub id: String,
    key: [u8; KEY_LEN],
}

impl EnvelopeKey {
    /// Build a KEK from raw material. Rejects anything but 32 bytes.
    pub fn new(id: impl Into<String>, material: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] =
            material
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: material.len(),
                })?;
        Ok(Self { id: id.into(), key })
    }
}

impl std::fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material must never reach logs.
        f.debug_struct("EnvelopeKey").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Sealed forms
// ---------------------------------------------------------------------------

/// One AES-GCM sealing: ciphertext plus its nonce and detached tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Ciphertext without the tag.
    pub ciphertext: Vec<u8>,
    /// 12-byte nonce.
    pub iv: Vec<u8>,
    /// 16-byte authentication tag.
    pub tag: Vec<u8>,
}

/// The persisted form of an envelope-encrypted secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedSecret {
    /// Identifier of the KEK the DEK is sealed under.
    pub kek_id: String,
    /// The DEK, sealed under the KEK.
    pub dek: SealedBox,
    /// The payload, sealed under the DEK.
    pub payload: SealedBox,
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<SealedBox, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })?;
    let iv = random_bytes(IV_LEN);
    let nonce = Nonce::from_slice(&iv);
    let mut combined = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::OpenFailed)?;
    // aes-gcm appends the tag; persist it detached per the storage schema.
    let tag = combined.split_off(combined.len() - TAG_LEN);
    Ok(SealedBox {
        ciphertext: combined,
        iv,
        tag,
    })
}

fn open(key: &[u8; KEY_LEN], sealed: &SealedBox) -> Result<Vec<u8>, CryptoError> {
    if sealed.iv.len() != IV_LEN || sealed.tag.len() != TAG_LEN {
        return Err(CryptoError::OpenFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })?;
    let nonce = Nonce::from_slice(&sealed.iv);
    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);
    cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| CryptoError::OpenFailed)
}

/// Seal `plaintext` with a fresh DEK and wrap the DEK under `kek`.
pub fn envelope_seal(kek: &EnvelopeKey, plaintext: &[u8]) -> Result<WrappedSecret, CryptoError> {
    let dek_bytes = random_bytes(KEY_LEN);
    let dek: [u8; KEY_LEN] = dek_bytes.as_slice().try_into().expect("fixed length");
    let payload = seal(&dek, plaintext)?;
    let wrapped_dek = seal(&kek.key, &dek_bytes)?;
    Ok(WrappedSecret {
        kek_id: kek.id.clone(),
        dek: wrapped_dek,
        payload,
    })
}

/// Unwrap the DEK under `kek` and open the payload.
///
/// The caller is responsible for dropping the returned plaintext as soon as
/// the request that needed it completes.
pub fn envelope_open(kek: &EnvelopeKey, wrapped: &WrappedSecret) -> Result<Vec<u8>, CryptoError> {
    let dek_bytes = open(&kek.key, &wrapped.dek)?;
    let dek: [u8; KEY_LEN] = dek_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::OpenFailed)?;
    open(&dek, &wrapped.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_kek() -> EnvelopeKey {
        EnvelopeKey::new("kek-test", &[7u8; 32]).unwrap()
    }

    #[test]
    fn seal_then_open_round_trips() {
        let kek = test_kek();
        let wrapped = envelope_seal(&kek, b"super secret value").unwrap();
        assert_eq!(wrapped.kek_id, "kek-test");
        assert_eq!(wrapped.payload.iv.len(), 12);
        assert_eq!(wrapped.payload.tag.len(), 16);
        let opened = envelope_open(&kek, &wrapped).unwrap();
        assert_eq!(opened, b"super secret value");
    }

    #[test]
    fn each_seal_uses_a_fresh_dek_and_iv() {
        let kek = test_kek();
        let a = envelope_seal(&kek, b"same plaintext").unwrap();
        let b = envelope_seal(&kek, b"same plaintext").unwrap();
        assert_ne!(a.payload.ciphertext, b.payload.ciphertext);
        assert_ne!(a.dek.ciphertext, b.dek.ciphertext);
        assert_ne!(a.payload.iv, b.payload.iv);
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let kek = test_kek();
        let mut wrapped = envelope_seal(&kek, b"payload").unwrap();
        wrapped.payload.ciphertext[0] ^= 0x01;
        assert!(matches!(
            envelope_open(&kek, &wrapped),
            Err(CryptoError::OpenFailed)
        ));
    }

    #[test]
    fn wrong_kek_fails_to_open() {
        let kek = test_kek();
        let other = EnvelopeKey::new("kek-other", &[9u8; 32]).unwrap();
        let wrapped = envelope_seal(&kek, b"payload").unwrap();
        assert!(matches!(
            envelope_open(&other, &wrapped),
            Err(CryptoError::OpenFailed)
        ));
    }

    #[test]
    fn kek_rejects_short_material() {
        assert!(matches!(
            EnvelopeKey::new("short", &[1u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let kek = test_kek();
        let rendered = format!("{kek:?}");
        assert!(rendered.contains("kek-test"));
        assert!(!rendered.contains("7, 7"));
    }
}
