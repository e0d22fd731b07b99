// SPDX-License-Identifier: MIT OR Apache-2.0
//! Users, organizations, memberships, invitations, and auth sessions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A platform user. Created by signup or on OAuth first-login; never deleted
/// by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    /// Lowercased email; unique across the platform.
    pub email_lower: String,
    /// Argon2id PHC string. Never serialized to clients.
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Organization
// ---------------------------------------------------------------------------

/// A tenant. Owns every per-tenant child row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    /// Unique identifier.
    pub id: Uuid,
    /// URL-safe slug; unique across the platform.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Opaque settings document (see [`OrgSettings`] for the known shape).
    pub settings: Value,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

/// The known shape of the organization settings document.
///
/// Stored as opaque JSON so older rows with extra keys keep round-tripping;
/// this struct is the validated view used on `PUT …/settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrgSettings {
    /// Default LLM selection for member-created sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_llm: Option<crate::agent::LlmSelection>,
    /// Per-org override of the org-context enforcement mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_context_enforcement: Option<String>,
    /// Default session limits applied when a create request omits them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_defaults: Option<crate::agent::SessionLimits>,
    /// Per-provider LLM endpoint overrides, keyed by provider id.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub llm_overrides: std::collections::BTreeMap<String, LlmOverride>,
}

/// An org-level override of how one LLM provider is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmOverride {
    /// Replacement base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Replacement wire dialect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_kind: Option<String>,
}

// ---------------------------------------------------------------------------
// Membership and roles
// ---------------------------------------------------------------------------

/// Role of a user inside an organization. Ordering is the permission
/// lattice: `Member < Admin < Owner`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RoleKey {
    /// Baseline membership.
    Member,
    /// Org administration short of ownership transfer.
    Admin,
    /// Exactly one per organization.
    Owner,
}

/// A user's membership in an organization; `(organization_id, user_id)` is
/// unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Organization.
    pub organization_id: Uuid,
    /// User.
    pub user_id: Uuid,
    /// Granted role.
    pub role_key: RoleKey,
    /// When the membership was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Auth sessions
// ---------------------------------------------------------------------------

/// A refresh-token session row. Active iff not revoked and not expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Unique identifier (also embedded in token payloads).
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// SHA-256 hex of the current refresh blob. Never serialized.
    #[serde(default, skip_serializing)]
    pub refresh_token_hash: String,
    /// Hard expiry.
    pub expires_at: DateTime<Utc>,
    /// Set when the session is revoked (logout).
    pub revoked_at: Option<DateTime<Utc>>,
    /// User agent captured at creation.
    pub user_agent: Option<String>,
    /// Client IP captured at creation.
    pub ip: Option<String>,
    /// Last successful authentication through this session.
    pub last_used_at: DateTime<Utc>,
}

impl AuthSession {
    /// Whether the session can still authenticate at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

/// Lifecycle of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    /// Issued, not yet acted on.
    Pending,
    /// Accepted; a membership exists.
    Accepted,
    /// Passed its expiry before being accepted.
    Expired,
    /// Withdrawn by an admin.
    Revoked,
}

/// An invitation to join an organization.
///
/// The token is `<organization_id>.<uuid>`; the first segment must equal
/// `organization_id` (checked on parse, again on accept).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    /// Unique identifier.
    pub id: Uuid,
    /// Target organization.
    pub organization_id: Uuid,
    /// Invitee email, lowercased.
    pub email_lower: String,
    /// Role granted on acceptance.
    pub role_key: RoleKey,
    /// Inviting user.
    pub invited_by_user_id: Uuid,
    /// Opaque acceptance token.
    pub token: String,
    /// Current status.
    pub status: InvitationStatus,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn role_ordering_is_the_permission_lattice() {
        assert!(RoleKey::Member < RoleKey::Admin);
        assert!(RoleKey::Admin < RoleKey::Owner);
    }

    #[test]
    fn session_activity_requires_unrevoked_and_unexpired() {
        let now = Utc::now();
        let mut session = AuthSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            refresh_token_hash: "hash".into(),
            expires_at: now + Duration::days(7),
            revoked_at: None,
            user_agent: None,
            ip: None,
            last_used_at: now,
        };
        assert!(session.is_active(now));
        assert!(!session.is_active(now + Duration::days(8)));
        session.revoked_at = Some(now);
        assert!(!session.is_active(now));
    }

    #[test]
    fn password_hash_never_serializes() {
        let user = User {
            id: Uuid::new_v4(),
            email_lower: "a@b.co".into(),
            password_hash: "argon2-material".into(),
            display_name: None,
            created_at: Utc::now(),
        };
        let rendered = serde_json::to_string(&user).unwrap();
        assert!(!rendered.contains("argon2-material"));
        assert!(rendered.contains("emailLower"));
    }
}
