// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow definition and run routes.

use crate::AppState;
use crate::extract::{require_role, run_failure, store_failure};
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
use vespid_core::{RoleKey, RunTrigger};
use vespid_error::{ApiFailure, ApiResult};
use vespid_store::{NewWorkflow, WorkflowDraftUpdate};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub dsl: Value,
    #[serde(default)]
    pub editor_state: Option<Value>,
}

fn check_dsl_shape(dsl: &Value) -> ApiResult<()> {
    // Shape validation only; DSL semantics belong to the execution engine.
    if !dsl.is_object() {
        return Err(ApiFailure::validation("workflow dsl must be an object"));
    }
    Ok(())
}

/// `POST /v1/orgs/{orgId}/workflows`
pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.name.trim().is_empty() {
        return Err(ApiFailure::validation("workflow name is required"));
    }
    check_dsl_shape(&body.dsl)?;
    let workflow = state
        .store
        .create_workflow(
            &org.tenant,
            NewWorkflow {
                organization_id: org.organization_id,
                family_id: None,
                source_workflow_id: None,
                name: body.name.trim().to_owned(),
                dsl: body.dsl,
                editor_state: body.editor_state,
                created_by: org.tenant.actor_user_id,
            },
        )
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "workflow": workflow }))))
}

/// `GET /v1/orgs/{orgId}/workflows`
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_workflows(
            &org.tenant,
            org.organization_id,
            query.cursor,
            crate::extract::page_limit(query.limit),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}

/// `GET /v1/orgs/{orgId}/workflows/{workflowId}`
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let workflow = state
        .store
        .workflow(&org.tenant, org.organization_id, workflow_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("workflow not found"))?;
    Ok(Json(json!({ "workflow": workflow })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dsl: Option<Value>,
    #[serde(default)]
    pub editor_state: Option<Value>,
}

/// `PUT /v1/orgs/{orgId}/workflows/{workflowId}` — drafts only; published
/// workflows answer 409.
pub async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateWorkflowRequest>,
) -> ApiResult<Json<Value>> {
    if let Some(dsl) = &body.dsl {
        check_dsl_shape(dsl)?;
    }
    let workflow = state
        .store
        .update_workflow_draft(
            &org.tenant,
            org.organization_id,
            workflow_id,
            WorkflowDraftUpdate {
                name: body.name,
                dsl: body.dsl,
                editor_state: body.editor_state,
            },
            Utc::now(),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "workflow": workflow })))
}

/// `GET /v1/orgs/{orgId}/workflows/{workflowId}/revisions`
pub async fn list_revisions(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let workflow = state
        .store
        .workflow(&org.tenant, org.organization_id, workflow_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("workflow not found"))?;
    let revisions = state
        .store
        .list_workflow_revisions(&org.tenant, org.organization_id, workflow.family_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "revisions": revisions })))
}

/// `POST /v1/orgs/{orgId}/workflows/{workflowId}/publish`
pub async fn publish_workflow(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let workflow = state
        .store
        .publish_workflow(&org.tenant, org.organization_id, workflow_id, Utc::now())
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "workflow": workflow })))
}

/// `POST /v1/orgs/{orgId}/workflows/{workflowId}/drafts` — next revision in
/// the family, seeded from the source revision.
pub async fn create_draft(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let source = state
        .store
        .workflow(&org.tenant, org.organization_id, workflow_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("workflow not found"))?;
    let draft = state
        .store
        .create_workflow(
            &org.tenant,
            NewWorkflow {
                organization_id: org.organization_id,
                family_id: Some(source.family_id),
                source_workflow_id: Some(source.id),
                name: source.name.clone(),
                dsl: source.dsl.clone(),
                editor_state: source.editor_state.clone(),
                created_by: org.tenant.actor_user_id,
            },
        )
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "workflow": draft }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

/// `POST /v1/orgs/{orgId}/workflows/{workflowId}/runs` — enqueue with
/// compensating rollback.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<StartRunRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&org, RoleKey::Member)?;
    let run = state
        .runs
        .start(
            &org.tenant,
            org.organization_id,
            workflow_id,
            RunTrigger::Manual,
            body.input.unwrap_or_else(|| json!({})),
            body.max_attempts,
            Some(org.tenant.actor_user_id),
        )
        .await
        .map_err(run_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "run": run }))))
}

/// `GET /v1/orgs/{orgId}/workflows/{workflowId}/runs`
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, workflow_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_runs(
            &org.tenant,
            org.organization_id,
            Some(workflow_id),
            query.cursor,
            crate::extract::page_limit(query.limit),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}

/// `GET /v1/orgs/{orgId}/runs/{runId}`
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, run_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let run = state
        .store
        .run(&org.tenant, org.organization_id, run_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiFailure::not_found("run not found"))?;
    Ok(Json(json!({ "run": run })))
}

/// `GET /v1/orgs/{orgId}/runs/{runId}/events`
pub async fn list_run_events(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, run_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .store
        .list_run_events(
            &org.tenant,
            org.organization_id,
            run_id,
            query.cursor,
            crate::extract::page_limit(query.limit),
        )
        .await
        .map_err(store_failure)?;
    Ok(Json(page_body(page)))
}
