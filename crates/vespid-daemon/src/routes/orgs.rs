// SPDX-License-Identifier: MIT OR Apache-2.0
//! Organization, membership, invitation, and settings routes.

use crate::AppState;
use crate::extract::{require_auth, require_role, store_failure};
use crate::middleware::MaybeAuth;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use vespid_auth::OrgContext;
use vespid_core::{InvitationStatus, OrgSettings, RoleKey};
use vespid_error::{ApiFailure, ApiResult, ErrorCode};
use vespid_store::{NewInvitation, NewOrganization, TenantContext};

/// Invitations live for 14 days.
const INVITATION_TTL_DAYS: i64 = 14;

fn slugify(name: &str) -> String {
    let base: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = base.trim_matches('-');
    if trimmed.is_empty() {
        "org".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrgRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// `POST /v1/orgs`
pub async fn create_org(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
    Json(body): Json<CreateOrgRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let auth = require_auth(&maybe)?;
    if body.name.trim().is_empty() {
        return Err(ApiFailure::validation("organization name is required"));
    }
    let slug = body.slug.unwrap_or_else(|| slugify(&body.name));
    let (organization, membership) = state
        .store
        .create_organization(
            &TenantContext::user(auth.user.id),
            NewOrganization {
                slug,
                name: body.name.trim().to_owned(),
                settings: json!({}),
            },
        )
        .await
        .map_err(store_failure)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "organization": organization, "membership": membership })),
    ))
}

/// `GET /v1/orgs`
pub async fn list_orgs(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
) -> ApiResult<Json<Value>> {
    let auth = require_auth(&maybe)?;
    let organizations = state
        .store
        .organizations_for_user(&TenantContext::user(auth.user.id))
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "organizations": organizations })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: RoleKey,
}

/// `POST /v1/orgs/{orgId}/invitations` (admin)
pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&org, RoleKey::Admin)?;
    if body.role == RoleKey::Owner {
        return Err(ApiFailure::new(
            ErrorCode::Forbidden,
            "ownership is transferred through the role endpoint, not invitations",
        ));
    }
    if !body.email.contains('@') {
        return Err(ApiFailure::validation("invitee email is invalid"));
    }
    let token = format!("{}.{}", org.organization_id, Uuid::new_v4());
    let invitation = state
        .store
        .create_invitation(
            &org.tenant,
            NewInvitation {
                organization_id: org.organization_id,
                email_lower: body.email.trim().to_lowercase(),
                role_key: body.role,
                invited_by_user_id: org.tenant.actor_user_id,
                token,
                expires_at: Utc::now() + Duration::days(INVITATION_TTL_DAYS),
            },
        )
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "invitation": invitation }))))
}

/// `POST /v1/invitations/{token}/accept`
///
/// Idempotent once accepted: replaying returns the same membership.
pub async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
    Path(token): Path<String>,
) -> ApiResult<Json<Value>> {
    let auth = require_auth(&maybe)?;
    let (token_org, _) = vespid_token::parse_prefixed_token(&token)
        .map_err(|_| ApiFailure::validation("malformed invitation token"))?;
    let invitation = state
        .store
        .invitation_by_token(&token)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("invitation not found"))?;
    // The token's org prefix must agree with the invitation row.
    if invitation.organization_id != token_org {
        return Err(ApiFailure::validation("malformed invitation token"));
    }
    if invitation.email_lower != auth.user.email_lower {
        return Err(ApiFailure::new(
            ErrorCode::Forbidden,
            "this invitation was issued to a different email",
        ));
    }

    match invitation.status {
        InvitationStatus::Accepted => {
            // Replay: hand back the existing membership unchanged.
            let membership = state
                .store
                .membership(invitation.organization_id, auth.user.id)
                .await
                .map_err(store_failure)?
                .ok_or_else(|| ApiFailure::internal("accepted invitation without membership"))?;
            return Ok(Json(json!({ "membership": membership, "alreadyAccepted": true })));
        }
        InvitationStatus::Revoked => {
            return Err(ApiFailure::conflict("invitation was revoked"));
        }
        InvitationStatus::Expired => {
            return Err(ApiFailure::conflict("invitation expired"));
        }
        InvitationStatus::Pending => {}
    }
    if Utc::now() >= invitation.expires_at {
        state
            .store
            .update_invitation_status(invitation.id, InvitationStatus::Expired)
            .await
            .map_err(store_failure)?;
        return Err(ApiFailure::conflict("invitation expired"));
    }

    let membership = state
        .store
        .create_membership(invitation.organization_id, auth.user.id, invitation.role_key)
        .await
        .map_err(store_failure)?;
    state
        .store
        .update_invitation_status(invitation.id, InvitationStatus::Accepted)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "membership": membership, "alreadyAccepted": false })))
}

/// `GET /v1/orgs/{orgId}/members`
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let members = state
        .store
        .memberships_for_org(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "members": members })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: RoleKey,
}

/// `POST /v1/orgs/{orgId}/members/{memberId}/role` (admin; owner grants
/// require the owner)
pub async fn update_member_role(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, member_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateRoleRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    // Only the existing owner may assign the owner role.
    if body.role == RoleKey::Owner && org.membership.role_key != RoleKey::Owner {
        return Err(ApiFailure::new(
            ErrorCode::Forbidden,
            "only the owner can transfer ownership",
        ));
    }
    let target = state
        .store
        .membership(org.organization_id, member_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("membership not found"))?;
    // Demoting the owner happens implicitly through ownership transfer.
    if target.role_key == RoleKey::Owner && body.role != RoleKey::Owner {
        return Err(ApiFailure::conflict(
            "transfer ownership before changing the owner's role",
        ));
    }
    let updated = state
        .store
        .update_membership_role(&org.tenant, org.organization_id, member_id, body.role)
        .await
        .map_err(store_failure)?;
    // Ownership transfer demotes the previous owner to admin.
    if body.role == RoleKey::Owner && member_id != org.tenant.actor_user_id {
        state
            .store
            .update_membership_role(
                &org.tenant,
                org.organization_id,
                org.tenant.actor_user_id,
                RoleKey::Admin,
            )
            .await
            .map_err(store_failure)?;
    }
    Ok(Json(json!({ "membership": updated })))
}

/// `GET /v1/orgs/{orgId}/settings`
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let organization = state
        .store
        .organization(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "settings": organization.settings })))
}

/// `PUT /v1/orgs/{orgId}/settings` (admin)
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    // Shape-check against the known settings schema before storing.
    let parsed: OrgSettings = serde_json::from_value(body).map_err(|err| {
        ApiFailure::validation("settings document is malformed")
            .with_details(json!({ "reason": err.to_string() }))
    })?;
    if let Some(default_llm) = &parsed.default_llm {
        if vespid_core::llm_provider(&default_llm.provider).is_none() {
            return Err(ApiFailure::validation(format!(
                "unknown default LLM provider {:?}",
                default_llm.provider
            )));
        }
    }
    let settings = serde_json::to_value(&parsed)
        .map_err(|_| ApiFailure::internal("settings serialization failed"))?;
    let organization = state
        .store
        .update_org_settings(&org.tenant, org.organization_id, settings)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "settings": organization.settings })))
}
