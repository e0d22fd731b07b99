// SPDX-License-Identifier: MIT OR Apache-2.0
//! Toolset routes, the public gallery, and the builder surface.

use crate::AppState;
use crate::extract::{builder_failure, draft_failure, require_role, store_failure};
use crate::routes::page_body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use vespid_auth::OrgContext;
use vespid_core::{LlmSelection, RoleKey, ToolsetDraft, ToolsetVisibility};
use vespid_error::{ApiFailure, ApiResult, ErrorCode};
use vespid_store::{NewToolset, StoreError};
use vespid_toolset::validate_draft;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Toolsets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateToolsetRequest {
    pub name: String,
    #[serde(default)]
    pub draft: Option<ToolsetDraft>,
    #[serde(default)]
    pub visibility: Option<ToolsetVisibility>,
}

/// `POST /v1/orgs/{orgId}/toolsets`
pub async fn create_toolset(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateToolsetRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.name.trim().is_empty() {
        return Err(ApiFailure::validation("toolset name is required"));
    }
    let visibility = body.visibility.unwrap_or(ToolsetVisibility::Private);
    if visibility == ToolsetVisibility::Public {
        return Err(ApiFailure::validation(
            "toolsets are published through the publish endpoint",
        ));
    }
    let draft = body.draft.unwrap_or_default();
    let server_names: Vec<String> = draft.mcp_servers.keys().cloned().collect();
    validate_draft(&draft, &server_names).map_err(draft_failure)?;
    let toolset = state
        .store
        .create_toolset(
            &org.tenant,
            NewToolset {
                organization_id: org.organization_id,
                name: body.name.trim().to_owned(),
                draft,
                visibility,
                created_by: org.tenant.actor_user_id,
            },
        )
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "toolset": toolset }))))
}

/// `GET /v1/orgs/{orgId}/toolsets`
pub async fn list_toolsets(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let toolsets = state
        .store
        .list_toolsets(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "toolsets": toolsets })))
}

/// `GET /v1/orgs/{orgId}/toolsets/{toolsetId}`
pub async fn get_toolset(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, toolset_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let toolset = state
        .store
        .toolset(&org.tenant, org.organization_id, toolset_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::new(ErrorCode::ToolsetNotFound, "toolset not found"))?;
    Ok(Json(json!({ "toolset": toolset })))
}

#[derive(Debug, Deserialize)]
pub struct PublishToolsetRequest {
    pub slug: String,
}

fn check_slug(slug: &str) -> ApiResult<()> {
    let ok = !slug.is_empty()
        && slug.len() <= 64
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ApiFailure::validation(
            "slug must be lowercase alphanumerics and dashes",
        ))
    }
}

/// `POST /v1/orgs/{orgId}/toolsets/{toolsetId}/publish` (admin)
pub async fn publish_toolset(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, toolset_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<PublishToolsetRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    check_slug(&body.slug)?;
    let toolset = state
        .store
        .publish_toolset(
            &org.tenant,
            org.organization_id,
            toolset_id,
            body.slug,
            Utc::now(),
        )
        .await
        .map_err(|err| match err {
            StoreError::Conflict { entity: "toolset_slug", .. } => ApiFailure::new(
                ErrorCode::PublicSlugConflict,
                "this public slug is already taken",
            ),
            StoreError::NotFound { .. } => {
                ApiFailure::new(ErrorCode::ToolsetNotFound, "toolset not found")
            }
            other => store_failure(other),
        })?;
    Ok(Json(json!({ "toolset": toolset })))
}

#[derive(Debug, Deserialize)]
pub struct UnpublishToolsetRequest {
    #[serde(default)]
    pub visibility: Option<ToolsetVisibility>,
}

/// `POST /v1/orgs/{orgId}/toolsets/{toolsetId}/unpublish` (admin)
///
/// Restores the requested (non-public) visibility and clears the slug and
/// publish timestamp.
pub async fn unpublish_toolset(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, toolset_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UnpublishToolsetRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    let visibility = body.visibility.unwrap_or(ToolsetVisibility::Org);
    if visibility == ToolsetVisibility::Public {
        return Err(ApiFailure::validation(
            "unpublish target visibility must be private or org",
        ));
    }
    let toolset = state
        .store
        .unpublish_toolset(
            &org.tenant,
            org.organization_id,
            toolset_id,
            visibility,
            Utc::now(),
        )
        .await
        .map_err(|err| match err {
            StoreError::NotFound { .. } => {
                ApiFailure::new(ErrorCode::ToolsetNotFound, "toolset not found")
            }
            other => store_failure(other),
        })?;
    Ok(Json(json!({ "toolset": toolset })))
}

/// `GET /v1/toolsets/public` — the gallery (anonymous).
pub async fn list_public(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_public_toolsets(query.cursor, crate::extract::page_limit(query.limit))
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}

/// `GET /v1/toolsets/public/{slug}` (anonymous)
pub async fn get_public(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    let toolset = state
        .store
        .toolset_by_public_slug(&slug)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::new(ErrorCode::ToolsetNotFound, "toolset not found"))?;
    Ok(Json(json!({ "toolset": toolset })))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderCreateRequest {
    pub llm: LlmSelection,
    #[serde(default)]
    pub intent: Option<String>,
}

/// `POST /v1/orgs/{orgId}/toolset-builder/sessions`
pub async fn builder_create_session(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<BuilderCreateRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let outcome = state
        .builder
        .create_session(&org.tenant, org.organization_id, body.llm, body.intent)
        .await
        .map_err(builder_failure)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session": outcome.session,
            "suggestedComponentKeys": outcome.suggested_component_keys,
            "assistantMessage": outcome.assistant_message,
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderChatRequest {
    pub message: String,
    #[serde(default)]
    pub selected_component_keys: Vec<String>,
}

/// `POST /v1/orgs/{orgId}/toolset-builder/sessions/{sessionId}/chat`
pub async fn builder_chat(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, session_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<BuilderChatRequest>,
) -> ApiResult<Json<Value>> {
    if body.message.trim().is_empty() {
        return Err(ApiFailure::validation("message is required"));
    }
    let outcome = state
        .builder
        .chat(
            &org.tenant,
            org.organization_id,
            session_id,
            &body.message,
            body.selected_component_keys,
        )
        .await
        .map_err(builder_failure)?;
    Ok(Json(json!({
        "session": outcome.session,
        "suggestedComponentKeys": outcome.suggested_component_keys,
        "assistantMessage": outcome.assistant_message,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct BuilderFinalizeRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /v1/orgs/{orgId}/toolset-builder/sessions/{sessionId}/finalize`
///
/// Finalizes the session and materializes the validated draft as a
/// toolset.
pub async fn builder_finalize(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, session_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<BuilderFinalizeRequest>>,
) -> ApiResult<Json<Value>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state
        .builder
        .finalize(&org.tenant, org.organization_id, session_id)
        .await
        .map_err(builder_failure)?;
    let toolset = state
        .store
        .create_toolset(
            &org.tenant,
            NewToolset {
                organization_id: org.organization_id,
                name: body
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "Untitled toolset".to_owned()),
                draft: outcome.draft.clone(),
                visibility: ToolsetVisibility::Org,
                created_by: org.tenant.actor_user_id,
            },
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({
        "session": outcome.session,
        "draft": outcome.draft,
        "toolset": toolset,
    })))
}
