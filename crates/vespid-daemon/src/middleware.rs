// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack: request logging with correlation ids, CORS, the auth
//! pre-handler, the org-context middleware, and the service-token gate.

use crate::cookies::{SESSION_COOKIE, cookie_value};
use crate::{AppState, extract};
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tracing::{info, warn};
use uuid::Uuid;
use vespid_auth::AuthContext;
use vespid_config::ControlPlaneConfig;
use vespid_error::ApiFailure;

// ---------------------------------------------------------------------------
// Request logging and correlation
// ---------------------------------------------------------------------------

/// Correlation id minted by [`request_logger`] for each request. Handlers
/// can read it from the extensions; clients get it back as `x-request-id`.
#[derive(Debug, Clone, Copy)]
pub struct TraceId(pub Uuid);

impl TraceId {
    fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::try_from(self.0.to_string()).ok()
    }
}

/// One log line per request: method, path, status, duration, and the
/// correlation id, which this middleware also mints and echoes back.
/// 4xx logs at warn, 5xx at error (the handler already logged the cause).
pub async fn request_logger(mut req: Request, next: Next) -> Response {
    let trace = TraceId(Uuid::new_v4());
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    req.extensions_mut().insert(trace);
    let start = Instant::now();

    let mut resp = next.run(req).await;
    if let Some(value) = trace.header_value() {
        resp.headers_mut().insert("x-request-id", value);
    }

    let status = resp.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    match status {
        500.. => tracing::error!(
            trace_id = %trace.0,
            http.method = %method,
            http.path = %path,
            http.status = status,
            http.duration_ms = duration_ms,
            "request failed"
        ),
        400..=499 => warn!(
            trace_id = %trace.0,
            http.method = %method,
            http.path = %path,
            http.status = status,
            http.duration_ms = duration_ms,
            "request rejected"
        ),
        _ => info!(
            trace_id = %trace.0,
            http.method = %method,
            http.path = %path,
            http.status = status,
            http.duration_ms = duration_ms,
            "request completed"
        ),
    }
    resp
}

// ---------------------------------------------------------------------------
// Auth pre-handler
// ---------------------------------------------------------------------------

/// Resolved authentication for this request; `auth: None` means anonymous.
#[derive(Clone, Default)]
pub struct MaybeAuth(pub Option<AuthContext>);

/// The pre-handler that runs before every route. It never fails: bad or
/// absent credentials simply leave the request anonymous, and route
/// handlers decide whether that is acceptable.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let mut passive_token: Option<String> = None;
    let mut auth: Option<AuthContext> = None;

    let bearer = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    if let Some(token) = bearer {
        auth = state.authenticator.authenticate_bearer(&token).await.ok();
    }
    if auth.is_none() {
        if let Some(blob) = cookie_value(req.headers(), SESSION_COOKIE) {
            if let Ok((ctx, access_token)) = state.authenticator.authenticate_refresh(&blob).await {
                auth = Some(ctx);
                passive_token = Some(access_token);
            }
        }
    }

    req.extensions_mut().insert(MaybeAuth(auth));
    let mut resp = next.run(req).await;
    if let Some(token) = passive_token {
        if let Ok(value) = HeaderValue::from_str(&token) {
            resp.headers_mut().insert("x-access-token", value);
        }
    }
    resp
}

// ---------------------------------------------------------------------------
// Org-context middleware
// ---------------------------------------------------------------------------

/// Resolve the org scope for every `/v1/orgs/{orgId}/...` route: validate
/// `X-Org-Id` against the route, load the membership, and stash the
/// resolved [`vespid_auth::OrgContext`] as an extension. In warn mode the
/// response carries the de-duplicated warning codes in
/// `x-org-context-warning`.
pub async fn org_context_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let auth = match req
        .extensions()
        .get::<MaybeAuth>()
        .and_then(|m| m.0.clone())
    {
        Some(auth) => auth,
        None => return ApiFailure::unauthorized("authentication required").into_response(),
    };

    let Some(route_org) = org_id_from_path(req.uri().path()) else {
        return ApiFailure::validation("orgId path segment must be a UUID").into_response();
    };
    let header = req
        .headers()
        .get("x-org-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let resolved = state
        .org_resolver
        .resolve(auth.user.id, route_org, header.as_deref(), None)
        .await;
    let org = match resolved {
        Ok(org) => org,
        Err(err) => return extract::org_context_failure(err).into_response(),
    };

    let mut warning_codes: Vec<&'static str> =
        org.warnings.iter().map(|w| w.as_str()).collect();
    warning_codes.dedup();

    req.extensions_mut().insert(org);
    let mut resp = next.run(req).await;
    if !warning_codes.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&warning_codes.join(",")) {
            resp.headers_mut().insert("x-org-context-warning", value);
        }
    }
    resp
}

/// Pull the `{orgId}` segment out of `/v1/orgs/{orgId}/...`.
fn org_id_from_path(path: &str) -> Option<Uuid> {
    let rest = path.strip_prefix("/v1/orgs/")?;
    let segment = rest.split('/').next()?;
    Uuid::parse_str(segment).ok()
}

// ---------------------------------------------------------------------------
// Service-token gate (internal routes)
// ---------------------------------------------------------------------------

/// Require a configured internal service token (`x-service-token`) or
/// gateway token (`x-gateway-token`) on `/internal/v1/...` routes.
pub async fn service_token_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let presented_service = req
        .headers()
        .get("x-service-token")
        .and_then(|v| v.to_str().ok());
    let presented_gateway = req
        .headers()
        .get("x-gateway-token")
        .and_then(|v| v.to_str().ok());

    let service_ok = matches!(
        (&state.config.internal_api_service_token, presented_service),
        (Some(expected), Some(presented))
            if vespid_crypto::ct_eq(expected.as_bytes(), presented.as_bytes())
    );
    let gateway_ok = matches!(
        (&state.config.gateway_service_token, presented_gateway),
        (Some(expected), Some(presented))
            if vespid_crypto::ct_eq(expected.as_bytes(), presented.as_bytes())
    );
    if !service_ok && !gateway_ok {
        return ApiFailure::unauthorized("service token required").into_response();
    }
    next.run(req).await
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// CORS layer allowing the configured web origin with credentials (the
/// refresh cookie rides on cross-origin requests from the web client).
pub fn cors_layer(config: &ControlPlaneConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = [config.web_base_url.as_str()]
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let methods: Vec<axum::http::Method> = ["GET", "POST", "PUT", "DELETE"]
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<axum::http::HeaderName> =
        ["authorization", "content-type", "x-org-id", "stripe-signature"]
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
    let exposed: Vec<axum::http::HeaderName> =
        ["x-access-token", "x-org-context-warning", "x-request-id"]
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::list(headers))
        .expose_headers(ExposeHeaders::list(exposed))
        .allow_credentials(true)
}
