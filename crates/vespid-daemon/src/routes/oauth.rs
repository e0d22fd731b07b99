// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth routes: login flows, the Vertex credential flow, and the LLM
//! device flow.

use crate::cookies::{
    OAUTH_NONCE_COOKIE, OAUTH_STATE_COOKIE, SESSION_COOKIE, VERTEX_NONCE_COOKIE,
    VERTEX_STATE_COOKIE, clear_cookie, cookie_value, set_cookie,
};
use crate::extract::{auth_failure, oauth_failure, vault_failure};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;
use vespid_auth::OrgContext;
use vespid_error::{ApiFailure, ApiResult, ErrorCode};
use vespid_oauth::{CallbackInput, OAuthProvider, StartOutcome};

fn provider_from(raw: &str) -> ApiResult<OAuthProvider> {
    OAuthProvider::parse(raw)
        .ok_or_else(|| ApiFailure::not_found(format!("unknown oauth provider {raw:?}")))
}

fn login_redirect_uri(state: &AppState, provider: OAuthProvider) -> String {
    format!(
        "{}/v1/auth/oauth/{}/callback",
        state.config.api_base_url.trim_end_matches('/'),
        provider.as_str(),
    )
}

fn vertex_redirect_uri(state: &AppState) -> String {
    format!(
        "{}/v1/vertex/oauth/callback",
        state.config.api_base_url.trim_end_matches('/'),
    )
}

fn flow_cookies(
    state: &AppState,
    outcome: &StartOutcome,
    state_name: &str,
    nonce_name: &str,
) -> AppendHeaders<[(HeaderName, String); 2]> {
    let ttl = state.config.oauth_context_ttl_sec;
    AppendHeaders([
        (
            SET_COOKIE,
            set_cookie(&state.config, state_name, &outcome.state_cookie, ttl),
        ),
        (
            SET_COOKIE,
            set_cookie(&state.config, nonce_name, &outcome.nonce_cookie, ttl),
        ),
    ])
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    #[serde(default)]
    pub mode: Option<String>,
}

/// `GET /v1/auth/oauth/{provider}/start`
pub async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<StartQuery>,
) -> ApiResult<Response> {
    let provider = provider_from(&provider)?;
    let redirect_uri = login_redirect_uri(&state, provider);
    let outcome = state
        .oauth
        .start_login(provider, &redirect_uri)
        .await
        .map_err(oauth_failure)?;
    let cookies = flow_cookies(&state, &outcome, OAUTH_STATE_COOKIE, OAUTH_NONCE_COOKIE);
    if query.mode.as_deref() == Some("redirect") {
        Ok((cookies, Redirect::temporary(&outcome.authorize_url)).into_response())
    } else {
        Ok((cookies, Json(json!({ "authorizeUrl": outcome.authorize_url }))).into_response())
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: String,
    pub code: String,
    #[serde(default)]
    pub mode: Option<String>,
}

fn web_error_redirect(state: &AppState, provider: &str, code: &str) -> Response {
    let url = format!(
        "{}/auth?oauth=error&provider={provider}&code={code}",
        state.config.web_base_url.trim_end_matches('/'),
    );
    Redirect::temporary(&url).into_response()
}

/// `GET /v1/auth/oauth/{provider}/callback`
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let html_mode = query.mode.as_deref() == Some("redirect");
    let provider = match provider_from(&provider) {
        Ok(provider) => provider,
        Err(failure) => return failure.into_response(),
    };
    let input = CallbackInput {
        state: query.state,
        code: query.code,
        state_cookie: cookie_value(&headers, OAUTH_STATE_COOKIE),
        nonce_cookie: cookie_value(&headers, OAUTH_NONCE_COOKIE),
    };
    let redirect_uri = login_redirect_uri(&state, provider);

    let result = async {
        let profile = state
            .oauth
            .complete_login(provider, input, &redirect_uri)
            .await
            .map_err(oauth_failure)?;
        state
            .authenticator
            .login_or_create_oauth_user(&profile.email, profile.display_name)
            .await
            .map_err(auth_failure)
    }
    .await;

    match result {
        Ok(bundle) => {
            let session_cookie = set_cookie(
                &state.config,
                SESSION_COOKIE,
                &bundle.refresh_token,
                state.config.session_ttl_sec,
            );
            let cleanup = AppendHeaders([
                (SET_COOKIE, clear_cookie(&state.config, OAUTH_STATE_COOKIE)),
                (SET_COOKIE, clear_cookie(&state.config, OAUTH_NONCE_COOKIE)),
                (SET_COOKIE, session_cookie),
            ]);
            if html_mode {
                let url = format!(
                    "{}/auth?oauth=success&provider={}",
                    state.config.web_base_url.trim_end_matches('/'),
                    provider.as_str(),
                );
                (cleanup, Redirect::temporary(&url)).into_response()
            } else {
                (
                    cleanup,
                    Json(json!({
                        "user": bundle.user,
                        "session": {
                            "id": bundle.session.id,
                            "token": bundle.access_token,
                            "expiresAt": bundle.session.expires_at,
                        },
                        "provider": provider.as_str(),
                    })),
                )
                    .into_response()
            }
        }
        Err(failure) => {
            if html_mode {
                web_error_redirect(&state, provider.as_str(), failure.code.as_str())
            } else {
                failure.into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Vertex flow
// ---------------------------------------------------------------------------

/// Context stashed in the Vertex state record; the Google redirect carries
/// no headers we can recover the org from.
#[derive(Debug, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VertexContext {
    organization_id: Uuid,
    user_id: Uuid,
    project_id: String,
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexStartQuery {
    pub project_id: String,
    pub location: String,
}

/// `GET /v1/orgs/{orgId}/vertex/oauth/start`
pub async fn vertex_start(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Query(query): Query<VertexStartQuery>,
) -> ApiResult<Response> {
    if query.project_id.trim().is_empty() || query.location.trim().is_empty() {
        return Err(ApiFailure::validation("projectId and location are required"));
    }
    let context = serde_json::to_string(&VertexContext {
        organization_id: org.organization_id,
        user_id: org.tenant.actor_user_id,
        project_id: query.project_id,
        location: query.location,
    })
    .map_err(|_| ApiFailure::internal("vertex context serialization failed"))?;
    let outcome = state
        .oauth
        .start_vertex(&vertex_redirect_uri(&state), context)
        .await
        .map_err(oauth_failure)?;
    let cookies = flow_cookies(&state, &outcome, VERTEX_STATE_COOKIE, VERTEX_NONCE_COOKIE);
    Ok((cookies, Json(json!({ "authorizeUrl": outcome.authorize_url }))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VertexCallbackQuery {
    pub state: String,
    pub code: String,
}

/// `GET /v1/vertex/oauth/callback`
///
/// Persists the refresh token as the org's `default` secret under
/// `llm.vertex.oauth`, rotating in place on conflict.
pub async fn vertex_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VertexCallbackQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let input = CallbackInput {
        state: query.state,
        code: query.code,
        state_cookie: cookie_value(&headers, VERTEX_STATE_COOKIE),
        nonce_cookie: cookie_value(&headers, VERTEX_NONCE_COOKIE),
    };
    let (refresh_token, context) = state
        .oauth
        .complete_vertex(input, &vertex_redirect_uri(&state))
        .await
        .map_err(oauth_failure)?;
    let context: VertexContext = serde_json::from_str(&context)
        .map_err(|_| ApiFailure::internal("vertex context was corrupted"))?;

    let client = state
        .config
        .vertex_oauth
        .as_ref()
        .ok_or_else(|| ApiFailure::new(
            ErrorCode::VertexOauthNotConfigured,
            "Vertex OAuth is not configured",
        ))?;
    let blob = serde_json::to_vec(&json!({
        "refreshToken": refresh_token,
        "projectId": context.project_id,
        "location": context.location,
        "clientId": client.client_id,
        "clientSecret": client.client_secret,
    }))
    .map_err(|_| ApiFailure::internal("vertex secret serialization failed"))?;

    let tenant = vespid_store::TenantContext::org(context.user_id, context.organization_id);
    let record = state
        .vault
        .upsert(
            &tenant,
            context.organization_id,
            "llm.vertex.oauth",
            "default",
            &blob,
        )
        .await
        .map_err(vault_failure)?;

    let cleanup = AppendHeaders([
        (SET_COOKIE, clear_cookie(&state.config, VERTEX_STATE_COOKIE)),
        (SET_COOKIE, clear_cookie(&state.config, VERTEX_NONCE_COOKIE)),
    ]);
    let url = format!(
        "{}/settings/llm?vertex=connected&secretId={}",
        state.config.web_base_url.trim_end_matches('/'),
        record.id,
    );
    Ok((cleanup, Redirect::temporary(&url)).into_response())
}

// ---------------------------------------------------------------------------
// Device flow
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStartRequest {
    pub provider: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /v1/orgs/{orgId}/llm/oauth/device/start`
pub async fn device_start(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<DeviceStartRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if vespid_core::llm_provider(&body.provider).is_none() {
        return Err(ApiFailure::validation(format!(
            "unknown llm provider {:?}",
            body.provider
        )));
    }
    let device_code = state
        .device_flow
        .start(
            org.organization_id,
            org.tenant.actor_user_id,
            body.provider,
            body.name.unwrap_or_else(|| "default".to_owned()),
        )
        .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "deviceCode": device_code })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePollRequest {
    pub device_code: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /v1/orgs/{orgId}/llm/oauth/device/poll`
///
/// Without a token: `{status: "pending"}`. With one: store it as a
/// connector secret, consume the device entry, answer
/// `{status: "connected", secretId}`.
pub async fn device_poll(
    State(state): State<Arc<AppState>>,
    Extension(org): Extension<OrgContext>,
    Json(body): Json<DevicePollRequest>,
) -> ApiResult<Json<Value>> {
    let entry = state
        .device_flow
        .peek(&body.device_code)
        .await
        .ok_or_else(|| ApiFailure::not_found("device flow not found or expired"))?;
    if entry.organization_id != org.organization_id {
        return Err(ApiFailure::not_found("device flow not found or expired"));
    }

    let Some(token) = body.token.filter(|t| !t.is_empty()) else {
        return Ok(Json(json!({ "status": "pending" })));
    };
    let record = state
        .vault
        .upsert(
            &org.tenant,
            org.organization_id,
            &format!("llm.{}.oauth", entry.provider),
            &entry.name,
            token.as_bytes(),
        )
        .await
        .map_err(vault_failure)?;
    state.device_flow.complete(&body.device_code).await;
    Ok(Json(json!({ "status": "connected", "secretId": record.id })))
}
