// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared harness for the HTTP integration suites: an in-process app over
//! the in-memory store and queue, plus request helpers.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use vespid_config::ControlPlaneConfig;
use vespid_daemon::{AppState, build_app};
use vespid_runs::InMemoryJobQueue;
use vespid_store::memory::InMemoryStore;

/// Webhook signing secret used across billing tests.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_integration";

/// Base configuration: all signing secrets set, KEK and Stripe configured,
/// strict org-context enforcement.
pub fn test_vars() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("AUTH_TOKEN_SECRET".to_owned(), "test-auth-secret".to_owned()),
        (
            "REFRESH_TOKEN_SECRET".to_owned(),
            "test-refresh-secret".to_owned(),
        ),
        (
            "OAUTH_STATE_SECRET".to_owned(),
            "test-oauth-secret".to_owned(),
        ),
        ("SECRETS_KEK_ID".to_owned(), "kek-test".to_owned()),
        (
            "SECRETS_KEK".to_owned(),
            vespid_crypto::b64url_encode(&[7u8; 32]),
        ),
        ("STRIPE_SECRET_KEY".to_owned(), "sk_test_x".to_owned()),
        (
            "STRIPE_WEBHOOK_SECRET".to_owned(),
            TEST_WEBHOOK_SECRET.to_owned(),
        ),
        ("GOOGLE_OAUTH_CLIENT_ID".to_owned(), "google-client".to_owned()),
        (
            "GOOGLE_OAUTH_CLIENT_SECRET".to_owned(),
            "google-secret".to_owned(),
        ),
    ])
}

pub struct TestApp {
    pub app: Router,
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<InMemoryJobQueue>,
}

/// Build an app with extra/overridden environment variables.
pub fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let mut vars = test_vars();
    for (key, value) in overrides {
        vars.insert((*key).to_owned(), (*value).to_owned());
    }
    let config = ControlPlaneConfig::from_vars(&vars).expect("test config");
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let state = AppState::new(config, store.clone(), queue.clone()).expect("app state");
    TestApp {
        app: build_app(state),
        store,
        queue,
    }
}

/// Build an app with the default test configuration.
pub fn spawn_app() -> TestApp {
    spawn_app_with(&[])
}

/// Request builder for JSON calls.
pub struct Call<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: Option<Value>,
    pub bearer: Option<&'a str>,
    pub org: Option<Uuid>,
    pub headers: Vec<(&'a str, String)>,
}

impl<'a> Call<'a> {
    pub fn new(method: &'a str, path: &'a str) -> Self {
        Self {
            method,
            path,
            body: None,
            bearer: None,
            org: None,
            headers: Vec::new(),
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn org(mut self, org: Uuid) -> Self {
        self.org = Some(org);
        self
    }

    pub fn header(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Run one request; returns status, parsed JSON body (when any), and the
/// raw response for header inspection.
pub async fn send(app: &Router, call: Call<'_>) -> (StatusCode, Value, Response<Body>) {
    let mut builder = Request::builder().method(call.method).uri(call.path);
    if let Some(token) = call.bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(org) = call.org {
        builder = builder.header("x-org-id", org.to_string());
    }
    for (name, value) in &call.headers {
        builder = builder.header(*name, value);
    }
    let request = match call.body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    let rebuilt = Response::from_parts(parts, Body::empty());
    (rebuilt.status(), json, rebuilt)
}

/// Signed-up caller: bearer token plus the personal workspace org id.
pub struct Actor {
    pub token: String,
    pub user_id: Uuid,
    pub org_id: Uuid,
}

/// Sign up a user and read back their personal workspace.
pub async fn signup(app: &Router, email: &str) -> Actor {
    let (status, body, _) = send(
        app,
        Call::new("POST", "/v1/auth/signup").json(serde_json::json!({
            "email": email,
            "password": "secret12",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
    let token = body["session"]["token"].as_str().unwrap().to_owned();
    let user_id = Uuid::parse_str(body["user"]["id"].as_str().unwrap()).unwrap();

    let (status, me, _) = send(app, Call::new("GET", "/v1/me").bearer(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let org_id =
        Uuid::parse_str(me["organizations"][0]["id"].as_str().unwrap()).unwrap();
    Actor {
        token,
        user_id,
        org_id,
    }
}
