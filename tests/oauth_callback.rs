// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth callback hardening: tampered or missing state cookies must fail
//! closed before any user is created.

mod support;

use axum::http::StatusCode;
use support::{Call, send, spawn_app};
use vespid_store::Store;

struct StartedFlow {
    state: String,
    state_cookie: String,
    nonce_cookie: String,
}

async fn start_google_flow(app: &axum::Router) -> StartedFlow {
    let (status, body, response) = send(app, Call::new("GET", "/v1/auth/oauth/google/start")).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let authorize_url = body["authorizeUrl"].as_str().unwrap();
    let parsed = url_state(authorize_url);

    let mut state_cookie = None;
    let mut nonce_cookie = None;
    for value in response.headers().get_all("set-cookie") {
        let raw = value.to_str().unwrap();
        let pair = raw.split(';').next().unwrap();
        if let Some(v) = pair.strip_prefix("vespid_oauth_state=") {
            state_cookie = Some(v.to_owned());
        }
        if let Some(v) = pair.strip_prefix("vespid_oauth_nonce=") {
            nonce_cookie = Some(v.to_owned());
        }
    }
    StartedFlow {
        state: parsed,
        state_cookie: state_cookie.expect("state cookie set"),
        nonce_cookie: nonce_cookie.expect("nonce cookie set"),
    }
}

fn url_state(authorize_url: &str) -> String {
    authorize_url
        .split_once("state=")
        .map(|(_, rest)| rest.split('&').next().unwrap().to_owned())
        .expect("state in authorize url")
}

fn flip_first_char(blob: &str) -> String {
    let replacement = if blob.starts_with('A') { "B" } else { "A" };
    format!("{replacement}{}", &blob[1..])
}

#[tokio::test]
async fn start_sets_both_flow_cookies_and_a_pkce_challenge() {
    let harness = spawn_app();
    let flow = start_google_flow(&harness.app).await;
    assert!(!flow.state.is_empty());
    assert!(!flow.state_cookie.is_empty());
    assert!(!flow.nonce_cookie.is_empty());

    let (_, body, _) = send(&harness.app, Call::new("GET", "/v1/auth/oauth/google/start")).await;
    let url = body["authorizeUrl"].as_str().unwrap();
    assert!(url.contains("code_challenge_method=S256"));
    assert!(url.contains("client_id=google-client"));
}

#[tokio::test]
async fn tampered_state_cookie_is_rejected_and_no_user_is_created() {
    let harness = spawn_app();
    let flow = start_google_flow(&harness.app).await;

    let tampered = flip_first_char(&flow.state_cookie);
    let cookies = format!(
        "vespid_oauth_state={tampered}; vespid_oauth_nonce={}",
        flow.nonce_cookie
    );
    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "GET",
            &format!(
                "/v1/auth/oauth/google/callback?state={}&code=any",
                flow.state
            ),
        )
        .header("cookie", cookies),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    // Nothing reached the user table.
    assert!(
        harness
            .store
            .user_by_email("a@b.co")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn missing_state_cookie_is_rejected() {
    let harness = spawn_app();
    let flow = start_google_flow(&harness.app).await;
    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "GET",
            &format!(
                "/v1/auth/oauth/google/callback?state={}&code=any",
                flow.state
            ),
        )
        .header("cookie", format!("vespid_oauth_nonce={}", flow.nonce_cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn unknown_state_is_rejected() {
    let harness = spawn_app();
    let flow = start_google_flow(&harness.app).await;
    // Valid cookies, but the state value addresses no in-memory record.
    let cookies = format!(
        "vespid_oauth_state={}; vespid_oauth_nonce={}",
        flow.state_cookie, flow.nonce_cookie
    );
    let (status, _, _) = send(
        &harness.app,
        Call::new(
            "GET",
            "/v1/auth/oauth/google/callback?state=some-other-state&code=any",
        )
        .header("cookie", cookies),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unconfigured_provider_start_is_404() {
    let harness = spawn_app();
    // github client settings are absent in the test config.
    let (status, body, _) = send(&harness.app, Call::new("GET", "/v1/auth/oauth/github/start")).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
}
