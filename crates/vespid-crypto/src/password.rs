// SPDX-License-Identifier: MIT OR Apache-2.0
//! Argon2id password hashing.

use crate::CryptoError;
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hash a password with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| CryptoError::PasswordHash(err.to_string()))
}

/// Verify a password against a stored PHC-format hash.
///
/// Malformed stored hashes verify as `false` rather than erroring; a login
/// attempt must not distinguish "bad password" from "bad row".
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash of a random unguessable password, for accounts created via OAuth
/// that must never be password-loginable.
pub fn random_password_hash() -> Result<String, CryptoError> {
    hash_password(&crate::random_token(32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("secret12").unwrap();
        assert!(verify_password("secret12", &hash));
        assert!(!verify_password("secret13", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("secret12").unwrap();
        let b = hash_password("secret12").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_verifies_false() {
        assert!(!verify_password("secret12", "not-a-phc-string"));
    }

    #[test]
    fn random_password_hash_never_matches_user_input() {
        let hash = random_password_hash().unwrap();
        assert!(!verify_password("", &hash));
        assert!(!verify_password("password", &hash));
    }
}
