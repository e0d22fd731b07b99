// SPDX-License-Identifier: MIT OR Apache-2.0
//! Password authentication and session lifecycle routes.

use crate::cookies::{SESSION_COOKIE, clear_cookie, cookie_value, set_cookie};
use crate::extract::{auth_failure, require_auth, store_failure};
use crate::AppState;
use crate::middleware::MaybeAuth;
use axum::Extension;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::SET_COOKIE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use vespid_auth::AuthSessionBundle;
use vespid_error::{ApiFailure, ApiResult};
use vespid_store::TenantContext;

fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned());
    (user_agent, ip)
}

/// `{user, session}` body plus the refresh cookie.
fn session_response(
    state: &AppState,
    bundle: AuthSessionBundle,
    status: StatusCode,
) -> Response {
    let body = json!({
        "user": bundle.user,
        "session": {
            "id": bundle.session.id,
            "token": bundle.access_token,
            "expiresAt": bundle.session.expires_at,
        },
    });
    let cookie = set_cookie(
        &state.config,
        SESSION_COOKIE,
        &bundle.refresh_token,
        state.config.session_ttl_sec,
    );
    (status, [(SET_COOKIE, cookie)], axum::Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn validate_credentials(email: &str, password: &str) -> ApiResult<()> {
    let mut problems = Vec::new();
    if !email.contains('@') || email.trim().len() < 3 {
        problems.push(json!({ "field": "email", "reason": "must be a valid email address" }));
    }
    if password.len() < 8 {
        problems.push(json!({ "field": "password", "reason": "must be at least 8 characters" }));
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiFailure::validation("invalid signup request")
            .with_details(json!({ "problems": problems })))
    }
}

/// `POST /v1/auth/signup`
pub async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<SignupRequest>,
) -> ApiResult<Response> {
    validate_credentials(&body.email, &body.password)?;
    let (user_agent, ip) = client_meta(&headers);
    let bundle = state
        .authenticator
        .signup(&body.email, &body.password, body.display_name, user_agent, ip)
        .await
        .map_err(auth_failure)?;
    Ok(session_response(&state, bundle, StatusCode::CREATED))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /v1/auth/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<LoginRequest>,
) -> ApiResult<Response> {
    let (user_agent, ip) = client_meta(&headers);
    let bundle = state
        .authenticator
        .login(&body.email, &body.password, user_agent, ip)
        .await
        .map_err(auth_failure)?;
    Ok(session_response(&state, bundle, StatusCode::OK))
}

/// `POST /v1/auth/refresh` — rotate the refresh session.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let blob = cookie_value(&headers, SESSION_COOKIE)
        .ok_or_else(|| ApiFailure::unauthorized("refresh cookie required"))?;
    let bundle = state.authenticator.rotate(&blob).await.map_err(auth_failure)?;
    Ok(session_response(&state, bundle, StatusCode::OK))
}

/// `POST /v1/auth/logout` — revoke the current session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
) -> ApiResult<Response> {
    let auth = require_auth(&maybe)?;
    state
        .authenticator
        .logout(auth.session_id)
        .await
        .map_err(auth_failure)?;
    let cookie = clear_cookie(&state.config, SESSION_COOKIE);
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        axum::Json(json!({ "ok": true })),
    )
        .into_response())
}

/// `POST /v1/auth/logout-all` — revoke every session of the user.
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
) -> ApiResult<Response> {
    let auth = require_auth(&maybe)?;
    let revoked = state
        .authenticator
        .logout_all(auth.user.id)
        .await
        .map_err(auth_failure)?;
    let cookie = clear_cookie(&state.config, SESSION_COOKIE);
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        axum::Json(json!({ "ok": true, "revoked": revoked })),
    )
        .into_response())
}

/// `GET /v1/me`
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(maybe): Extension<MaybeAuth>,
) -> ApiResult<axum::Json<serde_json::Value>> {
    let auth = require_auth(&maybe)?;
    let organizations = state
        .store
        .organizations_for_user(&TenantContext::user(auth.user.id))
        .await
        .map_err(store_failure)?;
    Ok(axum::Json(json!({
        "user": auth.user,
        "organizations": organizations,
    })))
}
