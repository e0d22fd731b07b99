// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executor pairing and long-lived executor tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A one-shot pairing token record.
///
/// The full token handed to the worker is `<id>.<opaque>`; only the SHA-256
/// of the opaque tail is stored. Consumed on first successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingTokenRecord {
    /// Record id; also the token's UUID prefix.
    pub id: Uuid,
    /// Organization the executor will join.
    pub organization_id: Uuid,
    /// User who minted the token.
    pub created_by: Uuid,
    /// SHA-256 hex of the opaque tail.
    #[serde(default, skip_serializing)]
    pub token_hash: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Set once exchanged.
    pub consumed_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl PairingTokenRecord {
    /// Whether the token can still be exchanged at `now`.
    pub fn is_exchangeable(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now < self.expires_at
    }
}

/// A long-lived executor credential issued by pairing (or by the internal
/// managed-executor route).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorTokenRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Executor display name.
    pub name: String,
    /// SHA-256 hex of the issued token.
    #[serde(default, skip_serializing)]
    pub token_hash: String,
    /// Set when revoked; revocation is idempotent.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}
