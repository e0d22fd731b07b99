// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connector-secret routes. Responses only ever carry the wrapped view.

use crate::AppState;
use crate::extract::{require_role, vault_failure};
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretRequest {
    pub connector_id: String,
    pub name: String,
    pub value: String,
}

/// `POST /v1/orgs/{orgId}/secrets` (admin)
pub async fn create_secret(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<CreateSecretRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&org, RoleKey::Admin)?;
    if body.name.trim().is_empty() {
        return Err(ApiFailure::validation("secret name is required"));
    }
    if body.value.is_empty() {
        return Err(ApiFailure::validation("secret value is required"));
    }
    let record = state
        .vault
        .create(
            &org.tenant,
            org.organization_id,
            &body.connector_id,
            body.name.trim(),
            body.value.as_bytes(),
        )
        .await
        .map_err(vault_failure)?;
    Ok((StatusCode::CREATED, Json(json!({ "secret": record }))))
}

/// `GET /v1/orgs/{orgId}/secrets`
pub async fn list_secrets(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
) -> ApiResult<Json<Value>> {
    let records = state
        .vault
        .list(&org.tenant, org.organization_id)
        .await
        .map_err(vault_failure)?;
    Ok(Json(json!({ "secrets": records })))
}

#[derive(Debug, Deserialize)]
pub struct RotateSecretRequest {
    pub value: String,
}

/// `POST /v1/orgs/{orgId}/secrets/{secretId}/rotate` (admin)
pub async fn rotate_secret(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, secret_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RotateSecretRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    if body.value.is_empty() {
        return Err(ApiFailure::validation("secret value is required"));
    }
    let record = state
        .vault
        .rotate(
            &org.tenant,
            org.organization_id,
            secret_id,
            body.value.as_bytes(),
        )
        .await
        .map_err(vault_failure)?;
    Ok(Json(json!({ "secret": record })))
}

/// `DELETE /v1/orgs/{orgId}/secrets/{secretId}` (admin)
pub async fn delete_secret(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Path((_org_id, secret_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    require_role(&org, RoleKey::Admin)?;
    state
        .vault
        .delete(&org.tenant, org.organization_id, secret_id)
        .await
        .map_err(vault_failure)?;
    Ok(Json(json!({ "ok": true })))
}
