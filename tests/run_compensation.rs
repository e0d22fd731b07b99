// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow lifecycle over HTTP: publish immutability and the
//! enqueue-with-compensation contract.

mod support;

use axum::http::StatusCode;
use serde_json::json;
use support::{Call, send, signup, spawn_app};

async fn create_workflow(harness: &support::TestApp, actor: &support::Actor) -> String {
    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &format!("/v1/orgs/{}/workflows", actor.org_id))
            .bearer(&actor.token)
            .org(actor.org_id)
            .json(json!({ "name": "sync-crm", "dsl": { "nodes": [] } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["workflow"]["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn unpublished_workflows_cannot_run() {
    let harness = spawn_app();
    let actor = signup(&harness.app, "wf@x.co").await;
    let workflow_id = create_workflow(&harness, &actor).await;

    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "POST",
            &format!("/v1/orgs/{}/workflows/{workflow_id}/runs", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id)
        .json(json!({ "input": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn published_workflows_are_immutable() {
    let harness = spawn_app();
    let actor = signup(&harness.app, "imm@x.co").await;
    let workflow_id = create_workflow(&harness, &actor).await;

    let publish_path = format!(
        "/v1/orgs/{}/workflows/{workflow_id}/publish",
        actor.org_id
    );
    let (status, _, _) = send(
        &harness.app,
        Call::new("POST", &publish_path).bearer(&actor.token).org(actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "PUT",
            &format!("/v1/orgs/{}/workflows/{workflow_id}", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id)
        .json(json!({ "name": "renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    // A new draft revision continues the family instead.
    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "POST",
            &format!("/v1/orgs/{}/workflows/{workflow_id}/drafts", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["workflow"]["revision"], 2);
    assert_eq!(body["workflow"]["status"], "draft");
}

#[tokio::test]
async fn queue_failure_compensates_the_run_row() {
    let harness = spawn_app();
    let actor = signup(&harness.app, "comp@x.co").await;
    let workflow_id = create_workflow(&harness, &actor).await;
    send(
        &harness.app,
        Call::new(
            "POST",
            &format!("/v1/orgs/{}/workflows/{workflow_id}/publish", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id),
    )
    .await;

    let runs_path = format!("/v1/orgs/{}/workflows/{workflow_id}/runs", actor.org_id);

    // Happy path: 201 and a queued row.
    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &runs_path)
            .bearer(&actor.token)
            .org(actor.org_id)
            .json(json!({ "input": { "k": "v" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["run"]["status"], "queued");
    let first_run_id = body["run"]["id"].as_str().unwrap().to_owned();

    // Queue down: 503 QUEUE_UNAVAILABLE and no new run listed.
    harness.queue.fail_next_enqueue();
    let (status, body, _) = send(
        &harness.app,
        Call::new("POST", &runs_path)
            .bearer(&actor.token)
            .org(actor.org_id)
            .json(json!({ "input": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "QUEUE_UNAVAILABLE");

    let (status, body, _) = send(
        &harness.app,
        Call::new("GET", &runs_path).bearer(&actor.token).org(actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], first_run_id);

    // The surviving run has its creation event.
    let (status, body, _) = send(
        &harness.app,
        Call::new(
            "GET",
            &format!("/v1/orgs/{}/runs/{first_run_id}/events", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["eventType"], "run_created");
    assert_eq!(body["items"][0]["seq"], 0);
}

#[tokio::test]
async fn pagination_cursor_walks_runs_to_an_empty_tail() {
    let harness = spawn_app();
    let actor = signup(&harness.app, "page@x.co").await;
    let workflow_id = create_workflow(&harness, &actor).await;
    send(
        &harness.app,
        Call::new(
            "POST",
            &format!("/v1/orgs/{}/workflows/{workflow_id}/publish", actor.org_id),
        )
        .bearer(&actor.token)
        .org(actor.org_id),
    )
    .await;

    let runs_path = format!("/v1/orgs/{}/workflows/{workflow_id}/runs", actor.org_id);
    for _ in 0..5 {
        let (status, _, _) = send(
            &harness.app,
            Call::new("POST", &runs_path)
                .bearer(&actor.token)
                .org(actor.org_id)
                .json(json!({ "input": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let mut seen = 0;
    let mut cursor: Option<String> = None;
    loop {
        let path = match &cursor {
            Some(cursor) => format!("{runs_path}?limit=2&cursor={cursor}"),
            None => format!("{runs_path}?limit=2"),
        };
        let (status, body, _) = send(
            &harness.app,
            Call::new("GET", &path).bearer(&actor.token).org(actor.org_id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        seen += body["items"].as_array().unwrap().len();
        match body["nextCursor"].as_str() {
            Some(next) => cursor = Some(next.to_owned()),
            None => break,
        }
    }
    assert_eq!(seen, 5);

    // A garbage cursor is a 400.
    let (status, body, _) = send(
        &harness.app,
        Call::new("GET", &format!("{runs_path}?cursor=!!!"))
            .bearer(&actor.token)
            .org(actor.org_id),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}
