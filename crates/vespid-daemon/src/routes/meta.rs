// SPDX-License-Identifier: MIT OR Apache-2.0
//! Health, capability, and catalog routes.

use crate::AppState;
use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use vespid_core::{LlmContext, channel_catalog, connector_catalog, llm_provider_catalog};
use vespid_error::{ApiFailure, ApiResult};

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": Utc::now().to_rfc3339(),
    }))
}

/// `GET /v1/meta/capabilities`
pub async fn capabilities(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut oauth_providers = Vec::new();
    if state.config.google_oauth.is_some() {
        oauth_providers.push("google");
    }
    if state.config.github_oauth.is_some() {
        oauth_providers.push("github");
    }
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "features": {
            "stripe": state.config.stripe.is_some(),
            "secretsVault": state.config.kek.is_some(),
            "vertexOauth": state.config.vertex_oauth.is_some(),
            "oauthProviders": oauth_providers,
        },
        "gatewayWsUrl": state.config.gateway_ws_url,
    }))
}

/// `GET /v1/meta/connectors`
pub async fn connectors() -> Json<Value> {
    Json(json!({ "connectors": connector_catalog() }))
}

/// `GET /v1/meta/channels`
pub async fn channels() -> Json<Value> {
    Json(json!({ "channels": channel_catalog() }))
}

#[derive(Debug, Deserialize)]
pub struct LlmProvidersQuery {
    context: Option<String>,
}

/// `GET /v1/llm/providers?context=session|workflowAgentRun|toolsetBuilder`
pub async fn llm_providers(Query(query): Query<LlmProvidersQuery>) -> ApiResult<Json<Value>> {
    let context = match query.context.as_deref() {
        None => None,
        Some("session") => Some(LlmContext::Session),
        Some("workflowAgentRun") => Some(LlmContext::WorkflowAgentRun),
        Some("toolsetBuilder") => Some(LlmContext::ToolsetBuilder),
        Some(other) => {
            return Err(ApiFailure::validation(format!(
                "unknown llm context {other:?}"
            )));
        }
    };
    let providers: Vec<_> = llm_provider_catalog()
        .iter()
        .filter(|p| context.is_none_or(|c| p.supports(c)))
        .collect();
    Ok(Json(json!({ "providers": providers })))
}
