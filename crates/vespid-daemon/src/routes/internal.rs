// SPDX-License-Identifier: MIT OR Apache-2.0
//! Internal, service-token-authenticated routes.

use crate::AppState;
use crate::extract::{run_failure, store_failure};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use vespid_core::RunTrigger;
use vespid_crypto::{random_token, sha256_hex};
use vespid_error::{ApiFailure, ApiResult};
use vespid_store::TenantContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueExecutorRequest {
    pub organization_id: Uuid,
    pub name: String,
}

/// `POST /internal/v1/managed-executors/issue` — mint a long-lived executor
/// token for a platform-managed worker.
pub async fn issue_managed_executor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IssueExecutorRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.name.trim().is_empty() {
        return Err(ApiFailure::validation("executor name is required"));
    }
    let opaque = random_token(32);
    let record = state
        .store
        .create_executor_token(
            body.organization_id,
            body.name.trim().to_owned(),
            sha256_hex(opaque.as_bytes()),
        )
        .await
        .map_err(store_failure)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "executor": record,
            "token": format!("{}.{opaque}", record.id),
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeExecutorRequest {
    pub organization_id: Uuid,
}

/// `POST /internal/v1/managed-executors/{executorId}/revoke` — idempotent.
pub async fn revoke_managed_executor(
    State(state): State<Arc<AppState>>,
    Path(executor_id): Path<Uuid>,
    Json(body): Json<RevokeExecutorRequest>,
) -> ApiResult<Json<Value>> {
    let record = state
        .store
        .revoke_executor_token(body.organization_id, executor_id, chrono::Utc::now())
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "executor": record })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusRequest {
    pub organization_id: Uuid,
    pub status: vespid_core::WorkflowRunStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Credits consumed by the run; debited on terminal success/failure.
    #[serde(default)]
    pub credits_used: Option<i64>,
}

/// `POST /internal/v1/runs/{runId}/status` — executors report run
/// progress through the gateway; terminal reports debit consumed credits.
///
/// Transition legality is enforced by the store against
/// `WorkflowRunStatus::valid_transitions`; an out-of-order report (e.g.
/// `queued` straight to `succeeded`) answers 409 and leaves the run
/// untouched.
pub async fn update_run_status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<RunStatusRequest>,
) -> ApiResult<Json<Value>> {
    // A negative cost is a malformed report, not a free run; reject it
    // before any state changes. `Some(0)` means "ran at no cost" and
    // deliberately leaves no ledger row.
    if body.credits_used.is_some_and(|c| c < 0) {
        return Err(ApiFailure::validation("creditsUsed must be non-negative"));
    }
    let ctx = TenantContext::org(Uuid::nil(), body.organization_id);
    let run = state
        .store
        .update_run_status(
            &ctx,
            body.organization_id,
            run_id,
            body.status,
            body.output,
            body.error,
            chrono::Utc::now(),
        )
        .await
        .map_err(store_failure)?;

    if let Some(credits_used) = body.credits_used.filter(|c| *c > 0) {
        if run.status.is_terminal() {
            state
                .store
                .apply_credit(
                    &ctx,
                    body.organization_id,
                    vespid_store::CreditDelta {
                        delta_credits: -credits_used,
                        reason: vespid_core::CreditReason::WorkflowRun,
                        stripe_event_id: None,
                        workflow_run_id: Some(run_id),
                        created_by: None,
                        metadata: json!({}),
                    },
                    chrono::Utc::now(),
                )
                .await
                .map_err(store_failure)?;
        }
    }
    Ok(Json(json!({ "run": run })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRunRequest {
    pub organization_id: Uuid,
    pub workflow_id: Uuid,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

/// `POST /internal/v1/channels/trigger-run` — channel-triggered run, same
/// compensating contract as the user-facing start.
pub async fn trigger_channel_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TriggerRunRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    // Internal callers act as the platform inside the addressed org.
    let ctx = TenantContext::org(Uuid::nil(), body.organization_id);
    let run = state
        .runs
        .start(
            &ctx,
            body.organization_id,
            body.workflow_id,
            RunTrigger::Channel,
            body.input.unwrap_or_else(|| json!({})),
            body.max_attempts,
            None,
        )
        .await
        .map_err(run_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "run": run }))))
}
