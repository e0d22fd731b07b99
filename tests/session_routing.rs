// SPDX-License-Identifier: MIT OR Apache-2.0
//! Binding resolution, session-key derivation, idempotent messaging, and
//! session reset over HTTP.

mod support;

use axum::http::StatusCode;
use serde_json::json;
use support::{Call, TestApp, send, signup, spawn_app_with};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Routed {
    harness: TestApp,
    actor: support::Actor,
    peer_agent: String,
    default_agent: String,
    _gateway: MockServer,
}

async fn routed_harness() -> Routed {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&gateway)
        .await;
    let harness = spawn_app_with(&[("GATEWAY_HTTP_URL", &gateway.uri())]);
    let actor = signup(&harness.app, "route@x.co").await;

    let mut agent_ids = Vec::new();
    for (name, engine) in [("support", "engine-a"), ("general", "engine-b")] {
        let (status, body, _) = send(
            &harness.app,
            Call::new("POST", &format!("/v1/orgs/{}/agents", actor.org_id))
                .bearer(&actor.token)
                .org(actor.org_id)
                .json(json!({ "name": name, "engineId": engine })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        agent_ids.push(body["agent"]["id"].as_str().unwrap().to_owned());
    }

    for (agent, dimension, match_spec, priority) in [
        (&agent_ids[0], "peer", json!({ "peer": "u1" }), 5),
        (&agent_ids[1], "default", json!({}), 0),
    ] {
        let (status, body, _) = send(
            &harness.app,
            Call::new("POST", &format!("/v1/orgs/{}/agent-bindings", actor.org_id))
                .bearer(&actor.token)
                .org(actor.org_id)
                .json(json!({
                    "agentId": agent,
                    "dimension": dimension,
                    "match": match_spec,
                    "priority": priority,
                })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    Routed {
        harness,
        actor,
        peer_agent: agent_ids[0].clone(),
        default_agent: agent_ids[1].clone(),
        _gateway: gateway,
    }
}

#[tokio::test]
async fn peer_binding_wins_for_its_peer_and_default_otherwise() {
    let routed = routed_harness().await;
    let sessions_path = format!("/v1/orgs/{}/agent-sessions", routed.actor.org_id);

    let (status, body, _) = send(
        &routed.harness.app,
        Call::new("POST", &sessions_path)
            .bearer(&routed.actor.token)
            .org(routed.actor.org_id)
            .json(json!({
                "scope": "per-peer",
                "peer": "u1",
                "llm": { "provider": "anthropic", "model": "claude-sonnet-4-5" },
            })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["session"]["routedAgentId"], routed.peer_agent);
    let key = body["session"]["sessionKey"].as_str().unwrap();
    assert!(key.ends_with(":peer:u1"), "{key}");

    // Another peer: the default binding wins; `main` scope keeps the key
    // free of peer segments.
    let (status, body, _) = send(
        &routed.harness.app,
        Call::new("POST", &sessions_path)
            .bearer(&routed.actor.token)
            .org(routed.actor.org_id)
            .json(json!({
                "scope": "main",
                "peer": "u2",
                "llm": { "provider": "anthropic", "model": "claude-sonnet-4-5" },
            })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session"]["routedAgentId"], routed.default_agent);
    let key = body["session"]["sessionKey"].as_str().unwrap();
    assert!(!key.contains(":peer:"), "{key}");
}

#[tokio::test]
async fn same_logical_conversation_dedupes() {
    let routed = routed_harness().await;
    let sessions_path = format!("/v1/orgs/{}/agent-sessions", routed.actor.org_id);
    let request = json!({
        "scope": "per-peer",
        "peer": "u1",
        "llm": { "provider": "anthropic", "model": "claude-sonnet-4-5" },
    });

    let (status, first, _) = send(
        &routed.harness.app,
        Call::new("POST", &sessions_path)
            .bearer(&routed.actor.token)
            .org(routed.actor.org_id)
            .json(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second, _) = send(
        &routed.harness.app,
        Call::new("POST", &sessions_path)
            .bearer(&routed.actor.token)
            .org(routed.actor.org_id)
            .json(request),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(second["session"]["id"], first["session"]["id"]);
}

#[tokio::test]
async fn duplicate_idempotency_key_returns_the_same_event() {
    let routed = routed_harness().await;
    let sessions_path = format!("/v1/orgs/{}/agent-sessions", routed.actor.org_id);
    let (_, body, _) = send(
        &routed.harness.app,
        Call::new("POST", &sessions_path)
            .bearer(&routed.actor.token)
            .org(routed.actor.org_id)
            .json(json!({
                "scope": "per-peer",
                "peer": "u1",
                "llm": { "provider": "anthropic", "model": "claude-sonnet-4-5" },
            })),
    )
    .await;
    let session_id = body["session"]["id"].as_str().unwrap().to_owned();
    let messages_path = format!(
        "/v1/orgs/{}/agent-sessions/{session_id}/messages",
        routed.actor.org_id
    );

    let mut results = Vec::new();
    for _ in 0..2 {
        let (status, body, _) = send(
            &routed.harness.app,
            Call::new("POST", &messages_path)
                .bearer(&routed.actor.token)
                .org(routed.actor.org_id)
                .json(json!({ "text": "hello", "idempotencyKey": "k1" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        results.push(body);
    }
    assert_eq!(results[0]["event"]["id"], results[1]["event"]["id"]);
    assert_eq!(results[0]["event"]["seq"], results[1]["event"]["seq"]);
    assert_eq!(results[1]["created"], false);

    // The log holds exactly one user event, at seq 0.
    let (status, body, _) = send(
        &routed.harness.app,
        Call::new(
            "GET",
            &format!(
                "/v1/orgs/{}/agent-sessions/{session_id}/events",
                routed.actor.org_id
            ),
        )
        .bearer(&routed.actor.token)
        .org(routed.actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["seq"], 0);
    assert_eq!(items[0]["eventType"], "user_message");
}

#[tokio::test]
async fn gateway_outage_keeps_the_event_and_surfaces_503() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&gateway)
        .await;
    let harness = spawn_app_with(&[("GATEWAY_HTTP_URL", &gateway.uri())]);
    let actor = signup(&harness.app, "down@x.co").await;

    let (_, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/orgs/{}/agent-sessions", actor.org_id))
            .bearer(&actor.token)
            .org(actor.org_id)
            .json(json!({
                "peer": "u1",
                "llm": { "provider": "anthropic", "model": "claude-sonnet-4-5" },
            })),
    )
    .await;
    let session_id = body["session"]["id"].as_str().unwrap().to_owned();

    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "POST",
            &format!("/v1/orgs/{}/agent-sessions/{session_id}/messages", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id)
        .json(json!({ "text": "hi", "idempotencyKey": "k1" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "QUEUE_UNAVAILABLE");

    // The appended event survived the failed delivery.
    let (_, body, _) = send(
        &harness.app,
        Call::new(
            "GET",
            &format!("/v1/orgs/{}/agent-sessions/{session_id}/events", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id),
    )
    .await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reset_clears_the_pin_and_logs_a_system_event() {
    let routed = routed_harness().await;
    let (_, body, _) = send(
        &routed.harness.app,
        Call::new("POST", &format!("/v1/orgs/{}/agent-sessions", routed.actor.org_id))
            .bearer(&routed.actor.token)
            .org(routed.actor.org_id)
            .json(json!({
                "peer": "u1",
                "llm": { "provider": "anthropic", "model": "claude-sonnet-4-5" },
            })),
    )
    .await;
    let session_id = body["session"]["id"].as_str().unwrap().to_owned();

    let (status, body, _) = send(
        &routed.harness.app,
        Call::new(
            "POST",
            &format!(
                "/v1/orgs/{}/agent-sessions/{session_id}/reset",
                routed.actor.org_id
            ),
        )
        .bearer(&routed.actor.token)
        .org(routed.actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session"]["pinnedAgentId"].is_null());

    let (_, body, _) = send(
        &routed.harness.app,
        Call::new(
            "GET",
            &format!(
                "/v1/orgs/{}/agent-sessions/{session_id}/events",
                routed.actor.org_id
            ),
        )
        .bearer(&routed.actor.token)
        .org(routed.actor.org_id),
    )
    .await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.last().unwrap()["eventType"], "system");
}
