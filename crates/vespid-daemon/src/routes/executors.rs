// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executor pairing routes.

use crate::AppState;
use crate::extract::{pairing_failure, require_role, store_failure};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use vespid_auth::OrgContext;
use vespid_core::RoleKey;
use vespid_error::{ApiFailure, ApiResult};

/// `POST /v1/orgs/{orgId}/executors/pair-token` (admin) — mint a one-shot
/// pairing token. The full token is returned exactly once.
pub async fn mint_pair_token(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&org, RoleKey::Admin)?;
    let minted = state
        .pairing
        .mint(&org.tenant, org.organization_id)
        .await
        .map_err(pairing_failure)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "pairingToken": minted.token,
            "expiresAt": minted.expires_at,
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    pub pairing_token: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /v1/executors/pair` — worker-facing exchange; the pairing token is
/// the whole proof.
pub async fn pair_executor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PairRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = body.name.unwrap_or_else(|| "executor".to_owned());
    if name.trim().is_empty() {
        return Err(ApiFailure::validation("executor name must be non-empty"));
    }
    let issued = state
        .pairing
        .exchange(&body.pairing_token, name.trim())
        .await
        .map_err(pairing_failure)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "executor": issued.record,
            "token": issued.token,
            "gatewayWsUrl": state.config.gateway_ws_url,
        })),
    ))
}

/// `GET /v1/orgs/{orgId}/executors`
pub async fn list_executors(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let executors = state
        .store
        .list_executor_tokens(&org.tenant, org.organization_id)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "executors": executors })))
}

/// `POST /v1/orgs/{orgId}/executors/{executorId}/revoke` (admin) —
/// idempotent: revoking an already-revoked executor is a 200 no-op.
pub async fn revoke_executor(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, executor_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    let record = state
        .pairing
        .revoke(org.organization_id, executor_id)
        .await
        .map_err(pairing_failure)?;
    Ok(Json(json!({ "executor": record })))
}
