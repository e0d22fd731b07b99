// SPDX-License-Identifier: MIT OR Apache-2.0
//! `X-Org-Id` validation, membership loading, and role gating.
//!
//! No org-scoped store call happens until the membership check has passed;
//! the resolver's output [`OrgContext`] carries the [`TenantContext`] that
//! all subsequent store calls must use.

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use vespid_core::{Membership, RoleKey};
use vespid_store::{Store, StoreError, TenantContext};

/// Enforcement mode for the org-context header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgContextMode {
    /// Missing or mismatched header is a 400.
    Strict,
    /// Fall back to the route org id and record a warning code.
    Warn,
}

/// De-duplicated warning codes surfaced via `x-org-context-warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// The header was absent.
    OrgContextMissing,
    /// The header was not a UUID.
    OrgContextInvalid,
    /// The header disagreed with the route.
    OrgContextMismatch,
}

impl WarningCode {
    /// Wire form for the response header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrgContextMissing => "org_context_missing",
            Self::OrgContextInvalid => "org_context_invalid",
            Self::OrgContextMismatch => "org_context_mismatch",
        }
    }
}

/// A resolved, membership-checked org scope.
#[derive(Debug, Clone)]
pub struct OrgContext {
    /// The organization in scope.
    pub organization_id: Uuid,
    /// The caller's membership.
    pub membership: Membership,
    /// Tenant context for store calls under this scope.
    pub tenant: TenantContext,
    /// Warnings accumulated in warn mode.
    pub warnings: Vec<WarningCode>,
}

/// Resolution failures, each mapping to one spec'd error code.
#[derive(Debug, thiserror::Error)]
pub enum OrgContextError {
    /// 400 `ORG_CONTEXT_REQUIRED`.
    #[error("organization context header required")]
    ContextRequired,
    /// 400 `INVALID_ORG_CONTEXT`.
    #[error("invalid organization context")]
    InvalidContext,
    /// 403 `ORG_ACCESS_DENIED`.
    #[error("not a member of this organization")]
    AccessDenied,
    /// 403 `FORBIDDEN` (role gate).
    #[error("insufficient role")]
    Forbidden,
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates `X-Org-Id` against the route and loads the membership.
pub struct OrgContextResolver {
    store: Arc<dyn Store>,
    mode: OrgContextMode,
}

impl OrgContextResolver {
    /// Build a resolver in the given mode.
    pub fn new(store: Arc<dyn Store>, mode: OrgContextMode) -> Self {
        Self { store, mode }
    }

    /// Resolve an org scope for `actor` on a route addressing `route_org_id`.
    ///
    /// `header` is the raw `X-Org-Id` value, if any. `required_role` gates
    /// the route (`None` means any member).
    pub async fn resolve(
        &self,
        actor_user_id: Uuid,
        route_org_id: Uuid,
        header: Option<&str>,
        required_role: Option<RoleKey>,
    ) -> Result<OrgContext, OrgContextError> {
        let mut warnings = Vec::new();

        let effective_org = match header {
            None => match self.mode {
                OrgContextMode::Strict => return Err(OrgContextError::ContextRequired),
                OrgContextMode::Warn => {
                    warnings.push(WarningCode::OrgContextMissing);
                    route_org_id
                }
            },
            Some(raw) => match Uuid::parse_str(raw.trim()) {
                Err(_) => match self.mode {
                    OrgContextMode::Strict => return Err(OrgContextError::InvalidContext),
                    OrgContextMode::Warn => {
                        warnings.push(WarningCode::OrgContextInvalid);
                        route_org_id
                    }
                },
                Ok(header_org) if header_org != route_org_id => match self.mode {
                    OrgContextMode::Strict => return Err(OrgContextError::InvalidContext),
                    OrgContextMode::Warn => {
                        warn!(%header_org, %route_org_id, "org context header mismatch");
                        warnings.push(WarningCode::OrgContextMismatch);
                        route_org_id
                    }
                },
                Ok(header_org) => header_org,
            },
        };

        let membership = self
            .store
            .membership(effective_org, actor_user_id)
            .await?
            .ok_or(OrgContextError::AccessDenied)?;

        if let Some(required) = required_role {
            if membership.role_key < required {
                return Err(OrgContextError::Forbidden);
            }
        }

        Ok(OrgContext {
            organization_id: effective_org,
            membership,
            tenant: TenantContext::org(actor_user_id, effective_org),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vespid_store::memory::InMemoryStore;
    use vespid_store::{NewOrganization, NewUser};

    async fn seeded() -> (Arc<InMemoryStore>, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user = store
            .create_user(NewUser {
                email_lower: "o@x.co".into(),
                password_hash: "h".into(),
                display_name: None,
            })
            .await
            .unwrap();
        let (org, _) = store
            .create_organization(
                &TenantContext::user(user.id),
                NewOrganization {
                    slug: "acme".into(),
                    name: "Acme".into(),
                    settings: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
        (store, user.id, org.id)
    }

    #[tokio::test]
    async fn strict_mode_requires_the_header() {
        let (store, user, org) = seeded().await;
        let resolver = OrgContextResolver::new(store, OrgContextMode::Strict);
        assert!(matches!(
            resolver.resolve(user, org, None, None).await,
            Err(OrgContextError::ContextRequired)
        ));
        assert!(matches!(
            resolver.resolve(user, org, Some("not-a-uuid"), None).await,
            Err(OrgContextError::InvalidContext)
        ));
        assert!(matches!(
            resolver
                .resolve(user, org, Some(&Uuid::new_v4().to_string()), None)
                .await,
            Err(OrgContextError::InvalidContext)
        ));
        let resolved = resolver
            .resolve(user, org, Some(&org.to_string()), None)
            .await
            .unwrap();
        assert!(resolved.warnings.is_empty());
        assert_eq!(resolved.tenant.organization_id, Some(org));
    }

    #[tokio::test]
    async fn warn_mode_falls_back_to_the_route_org() {
        let (store, user, org) = seeded().await;
        let resolver = OrgContextResolver::new(store, OrgContextMode::Warn);

        let resolved = resolver.resolve(user, org, None, None).await.unwrap();
        assert_eq!(resolved.organization_id, org);
        assert_eq!(resolved.warnings, vec![WarningCode::OrgContextMissing]);

        let resolved = resolver
            .resolve(user, org, Some(&Uuid::new_v4().to_string()), None)
            .await
            .unwrap();
        assert_eq!(resolved.organization_id, org);
        assert_eq!(resolved.warnings, vec![WarningCode::OrgContextMismatch]);
    }

    #[tokio::test]
    async fn non_members_are_denied_before_any_org_scoped_call() {
        let (store, _user, org) = seeded().await;
        let stranger = store
            .create_user(NewUser {
                email_lower: "s@x.co".into(),
                password_hash: "h".into(),
                display_name: None,
            })
            .await
            .unwrap();
        let resolver = OrgContextResolver::new(store, OrgContextMode::Strict);
        assert!(matches!(
            resolver
                .resolve(stranger.id, org, Some(&org.to_string()), None)
                .await,
            Err(OrgContextError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn role_gate_uses_the_lattice() {
        let (store, owner, org) = seeded().await;
        let member = store
            .create_user(NewUser {
                email_lower: "m@x.co".into(),
                password_hash: "h".into(),
                display_name: None,
            })
            .await
            .unwrap();
        store
            .create_membership(org, member.id, RoleKey::Member)
            .await
            .unwrap();
        let resolver = OrgContextResolver::new(store, OrgContextMode::Strict);
        let header = org.to_string();

        assert!(matches!(
            resolver
                .resolve(member.id, org, Some(&header), Some(RoleKey::Admin))
                .await,
            Err(OrgContextError::Forbidden)
        ));
        assert!(resolver
            .resolve(owner, org, Some(&header), Some(RoleKey::Admin))
            .await
            .is_ok());
        assert!(resolver
            .resolve(owner, org, Some(&header), Some(RoleKey::Owner))
            .await
            .is_ok());
    }
}
