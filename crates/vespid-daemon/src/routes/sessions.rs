// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent registry, routing bindings, and agent-session routes.

use crate::AppState;
use crate::extract::{require_role, router_failure, store_failure};
use crate::routes::page_body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use vespid_auth::OrgContext;
use vespid_core::{
    BindingDimension, ExecutorSelector, LlmSelection, OrgSettings, PromptSpec, RoleKey,
    SessionLimits, SessionScope,
};
use vespid_error::{ApiFailure, ApiResult};
use vespid_router::CreateSessionParams;
use vespid_store::{NewAgent, NewBinding};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    pub engine_id: String,
    #[serde(default)]
    pub is_default: bool,
}

/// `POST /v1/orgs/{orgId}/agents` (admin)
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&org, RoleKey::Admin)?;
    if body.name.trim().is_empty() || body.engine_id.trim().is_empty() {
        return Err(ApiFailure::validation("agent name and engineId are required"));
    }
    let agent = state
        .store
        .create_agent(
            &org.tenant,
            NewAgent {
                organization_id: org.organization_id,
                name: body.name.trim().to_owned(),
                engine_id: body.engine_id.trim().to_owned(),
                is_default: body.is_default,
            },
        )
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "agent": agent }))))
}

/// `GET /v1/orgs/{orgId}/agents`
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let agents = state
        .store
        .list_agents(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "agents": agents })))
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBindingRequest {
    pub agent_id: Uuid,
    #[serde(default)]
    pub priority: i32,
    pub dimension: BindingDimension,
    #[serde(default, rename = "match")]
    pub match_spec: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// `POST /v1/orgs/{orgId}/agent-bindings` (admin)
pub async fn create_binding(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateBindingRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&org, RoleKey::Admin)?;
    if !body.match_spec.is_object() && !body.match_spec.is_null() {
        return Err(ApiFailure::validation("match must be an object"));
    }
    let binding = state
        .store
        .create_binding(
            &org.tenant,
            NewBinding {
                organization_id: org.organization_id,
                agent_id: body.agent_id,
                priority: body.priority,
                dimension: body.dimension,
                match_spec: if body.match_spec.is_null() {
                    json!({})
                } else {
                    body.match_spec
                },
                metadata: body.metadata,
            },
        )
        .await
        .map_err(|err| match err {
            vespid_store::StoreError::NotFound { entity: "agent" } => {
                ApiFailure::new(vespid_error::ErrorCode::AgentNotFound, "agent not found")
            }
            other => store_failure(other),
        })?;
    Ok((StatusCode::CREATED, Json(json!({ "binding": binding }))))
}

/// `GET /v1/orgs/{orgId}/agent-bindings`
pub async fn list_bindings(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let bindings = state
        .store
        .list_bindings(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "bindings": bindings })))
}

/// `DELETE /v1/orgs/{orgId}/agent-bindings/{bindingId}` (admin)
pub async fn delete_binding(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, binding_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    state
        .store
        .delete_binding(&org.tenant, org.organization_id, binding_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "ok": true })))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub scope: Option<SessionScope>,
    #[serde(default)]
    pub peer: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub engine_id: Option<String>,
    #[serde(default)]
    pub toolset_id: Option<Uuid>,
    #[serde(default)]
    pub llm: Option<LlmSelection>,
    #[serde(default)]
    pub prompt: Option<PromptSpec>,
    #[serde(default)]
    pub tools_allow: Vec<String>,
    #[serde(default)]
    pub limits: Option<SessionLimits>,
    #[serde(default)]
    pub executor_selector: Option<ExecutorSelector>,
}

async fn org_settings(state: &AppState, org: &OrgContext) -> ApiResult<OrgSettings> {
    let organization = state
        .store
        .organization(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(serde_json::from_value(organization.settings).unwrap_or_default())
}

/// `POST /v1/orgs/{orgId}/agent-sessions`
///
/// 201 when a session is created; 200 with the existing session when the
/// derived key dedupes into an active conversation.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let settings = org_settings(&state, &org).await?;
    let creation = state
        .router
        .create_session(
            &org.tenant,
            org.organization_id,
            org.membership.role_key,
            &settings,
            CreateSessionParams {
                scope: body.scope,
                peer: body.peer,
                team: body.team,
                account: body.account,
                channel: body.channel,
                engine_id: body.engine_id,
                toolset_id: body.toolset_id,
                llm: body.llm,
                prompt: body.prompt.unwrap_or_default(),
                tools_allow: body.tools_allow,
                limits: body.limits,
                executor_selector: body.executor_selector.unwrap_or_default(),
            },
        )
        .await
        .map_err(router_failure)?;
    let status = if creation.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({ "session": creation.session, "created": creation.created })),
    ))
}

/// `GET /v1/orgs/{orgId}/agent-sessions`
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_agent_sessions(
            &org.tenant,
            org.organization_id,
            query.cursor,
            crate::extract::page_limit(query.limit),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}

/// `GET /v1/orgs/{orgId}/agent-sessions/{sessionId}`
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, session_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let session = state
        .store
        .agent_session(&org.tenant, org.organization_id, session_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("agent session not found"))?;
    Ok(Json(json!({ "session": session })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// `POST /v1/orgs/{orgId}/agent-sessions/{sessionId}/messages`
///
/// 202: the user event is appended (idempotently) and forwarded; a gateway
/// outage keeps the event and answers 503.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, session_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let payload = match (body.payload, body.text) {
        (Some(payload), _) => payload,
        (None, Some(text)) if !text.is_empty() => json!({ "text": text }),
        _ => {
            return Err(ApiFailure::validation(
                "either text or payload is required",
            ));
        }
    };
    let (event, created) = state
        .router
        .post_message(
            &org.tenant,
            org.organization_id,
            session_id,
            payload,
            body.idempotency_key,
        )
        .await
        .map_err(router_failure)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "event": event, "created": created })),
    ))
}

/// `GET /v1/orgs/{orgId}/agent-sessions/{sessionId}/events`
pub async fn list_session_events(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, session_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_session_events(
            &org.tenant,
            org.organization_id,
            session_id,
            query.cursor,
            crate::extract::page_limit(query.limit),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}

/// `POST /v1/orgs/{orgId}/agent-sessions/{sessionId}/reset`
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, session_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let session = state
        .router
        .reset_session(&org.tenant, org.organization_id, session_id)
        .await
        .map_err(router_failure)?;
    Ok(Json(json!({ "session": session })))
}
