// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authentication and authorization for the Vespid control plane.
//!
//! Three concerns live here:
//!
//! - [`Authenticator`] — signup/login, bearer and refresh-cookie
//!   resolution, rotation, logout;
//! - [`OrgContextResolver`] — `X-Org-Id` validation, membership loading,
//!   and role gating in strict or warn mode;
//! - [`pairing`] — one-shot pairing tokens exchanged for long-lived
//!   executor tokens.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authenticator;
mod org_context;
pub mod pairing;

pub use authenticator::{AuthSessionBundle, Authenticator, AuthenticatorConfig};
pub use org_context::{OrgContext, OrgContextError, OrgContextMode, OrgContextResolver, WarningCode};

use uuid::Uuid;
use vespid_core::User;
use vespid_crypto::CryptoError;
use vespid_store::StoreError;

// ---------------------------------------------------------------------------
// AuthContext
// ---------------------------------------------------------------------------

/// The resolved identity attached to a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The authenticated user.
    pub user: User,
    /// The auth session the credentials belong to.
    pub session_id: Uuid,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong email or password. The message is deliberately identical for
    /// both cases.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed, expired, or revoked credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Signup with an email that is already registered.
    #[error("email already registered")]
    EmailTaken,

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Crypto failure (password hashing).
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
