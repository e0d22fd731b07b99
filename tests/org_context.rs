// SPDX-License-Identifier: MIT OR Apache-2.0
//! `X-Org-Id` enforcement in strict and warn modes, plus membership and
//! role gates over HTTP.

mod support;

use axum::http::StatusCode;
use serde_json::json;
use support::{Call, send, signup, spawn_app, spawn_app_with};
use uuid::Uuid;

#[tokio::test]
async fn strict_mode_requires_a_matching_header() {
    let harness = spawn_app();
    let actor = signup(&harness.app, "o@x.co").await;
    let path = format!("/v1/orgs/{}/workflows", actor.org_id);

    // Missing header.
    let (status, body, _) = send(&harness.app, Call::new("GET", &path).bearer(&actor.token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ORG_CONTEXT_REQUIRED");

    // Unparseable header.
    let (status, body, _) = send(
        &harness.app,
        Call::new("GET", &path)
            .bearer(&actor.token)
            .header("x-org-id", "not-a-uuid"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ORG_CONTEXT");

    // Mismatched header.
    let (status, body, _) = send(
        &harness.app,
        Call::new("GET", &path)
            .bearer(&actor.token)
            .header("x-org-id", Uuid::new_v4().to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ORG_CONTEXT");

    // Matching header.
    let (status, _, response) = send(
        &harness.app,
        Call::new("GET", &path).bearer(&actor.token).org(actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!response.headers().contains_key("x-org-context-warning"));
}

#[tokio::test]
async fn warn_mode_falls_back_and_sets_the_warning_header() {
    let harness = spawn_app_with(&[("ORG_CONTEXT_ENFORCEMENT", "warn")]);
    let actor = signup(&harness.app, "w@x.co").await;
    let path = format!("/v1/orgs/{}/workflows", actor.org_id);

    // Missing header: 200 with the route org and a warning code.
    let (status, _, response) = send(&harness.app, Call::new("GET", &path).bearer(&actor.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-org-context-warning")
            .unwrap()
            .to_str()
            .unwrap(),
        "org_context_missing",
    );

    // Mismatched header: 200, route org used, mismatch warning.
    let (status, _, response) = send(
        &harness.app,
        Call::new("GET", &path)
            .bearer(&actor.token)
            .header("x-org-id", Uuid::new_v4().to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-org-context-warning")
            .unwrap()
            .to_str()
            .unwrap(),
        "org_context_mismatch",
    );
}

#[tokio::test]
async fn non_members_are_denied() {
    let harness = spawn_app();
    let owner = signup(&harness.app, "owner@x.co").await;
    let stranger = signup(&harness.app, "stranger@x.co").await;

    let path = format!("/v1/orgs/{}/workflows", owner.org_id);
    let (status, body, _) = send(
        &harness.app,
        Call::new("GET", &path).bearer(&stranger.token).org(owner.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ORG_ACCESS_DENIED");
}

#[tokio::test]
async fn invitation_accept_is_idempotent_and_email_bound() {
    let harness = spawn_app();
    let owner = signup(&harness.app, "owner2@x.co").await;
    let invitee = signup(&harness.app, "member@x.co").await;
    let outsider = signup(&harness.app, "other@x.co").await;

    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/orgs/{}/invitations", owner.org_id))
            .bearer(&owner.token)
            .org(owner.org_id)
            .json(json!({ "email": "member@x.co", "role": "member" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let token = body["invitation"]["token"].as_str().unwrap().to_owned();
    assert!(token.starts_with(&owner.org_id.to_string()));

    // The wrong account cannot accept.
    let (status, _, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/invitations/{token}/accept")).bearer(&outsider.token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // First accept creates the membership.
    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/invitations/{token}/accept")).bearer(&invitee.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyAccepted"], false);
    assert_eq!(body["membership"]["roleKey"], "member");

    // Replay returns the same membership.
    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/invitations/{token}/accept")).bearer(&invitee.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyAccepted"], true);
    assert_eq!(body["membership"]["userId"], invitee.user_id.to_string());
}

#[tokio::test]
async fn member_role_cannot_administer() {
    let harness = spawn_app();
    let owner = signup(&harness.app, "own3@x.co").await;
    let member = signup(&harness.app, "mem3@x.co").await;

    // Invite + accept as member.
    let (_, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/orgs/{}/invitations", owner.org_id))
            .bearer(&owner.token)
            .org(owner.org_id)
            .json(json!({ "email": "mem3@x.co", "role": "member" })),
    )
    .await;
    let token = body["invitation"]["token"].as_str().unwrap().to_owned();
    send(
        &harness.app,
        Call::new("POST", &format!("/v1/invitations/{token}/accept")).bearer(&member.token),
    )
    .await;

    // Members cannot mint secrets (admin gate).
    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/orgs/{}/secrets", owner.org_id))
            .bearer(&member.token)
            .org(owner.org_id)
            .json(json!({ "connectorId": "slack", "name": "bot", "value": "xoxb-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    // Only the owner may grant the owner role.
    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "POST",
            &format!("/v1/orgs/{}/members/{}/role", owner.org_id, member.user_id),
        )
        .bearer(&member.token)
        .org(owner.org_id)
        .json(json!({ "role": "owner" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}
