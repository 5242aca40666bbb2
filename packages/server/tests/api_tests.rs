//! HTTP surface over in-memory stores. Only routes that answer before
//! touching Postgres are exercised here; the database-backed paths are
//! covered in `db_tests.rs`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::json;

use common::{running_run, test_registry, TestApp, TEST_WEBHOOK_SECRET};
use jobtrack_core::common::UserId;
use jobtrack_core::kernel::test_dependencies::InMemoryRunStore;
use jobtrack_core::kernel::TestDependencies;
use jobtrack_core::server::routes::webhooks::{sign_payload, SIGNATURE_HEADER};

fn app_with_secret(secret: &str) -> (TestApp, Arc<InMemoryRunStore>) {
    let test_deps = TestDependencies::new();
    let runs = test_deps.run_store.clone();
    let app = TestApp::new(test_deps.into_lazy_deps(), test_registry().registry, secret);
    (app, runs)
}

fn app() -> (TestApp, Arc<InMemoryRunStore>) {
    app_with_secret(TEST_WEBHOOK_SECRET)
}

fn webhook_request(user_id: UserId, pipeline: &str, body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{}/{}", user_id, pipeline))
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_api_requires_token() {
    let (app, _) = app();

    let (status, body) = app.get("/api/pipelines", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = app.get("/api/pipelines", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/pipeline-runs", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_pipelines() {
    let (app, _) = app();
    let token = app.token_for(UserId::new());

    let (status, body) = app.get("/api/pipelines", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    let pipelines = body.as_array().unwrap();
    assert_eq!(pipelines.len(), 5);
    let echo = pipelines.iter().find(|p| p["name"] == "echo").unwrap();
    assert_eq!(echo["webhook"], true);
    assert_eq!(echo["agent_tool"], true);
    assert!(echo["input_schema"]["properties"]["message"].is_object());
}

#[tokio::test]
async fn test_run_unknown_pipeline_is_not_found() {
    let (app, runs) = app();
    let token = app.token_for(UserId::new());

    let (status, body) = app
        .post_json("/api/pipelines/nope/run", Some(&token), &json!({}))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
    assert!(runs.runs().is_empty());
}

#[tokio::test]
async fn test_runs_are_scoped_to_the_caller() {
    let (app, runs) = app();
    let me = UserId::new();
    let someone_else = UserId::new();

    let mut mine = running_run("echo", Utc::now(), None);
    mine.user_id = Some(me);
    let mut theirs = running_run("echo", Utc::now(), None);
    theirs.user_id = Some(someone_else);
    runs.insert(mine.clone());
    runs.insert(theirs.clone());

    let token = app.token_for(me);
    let (status, body) = app.get("/api/pipeline-runs", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], mine.id.to_string());
    assert_eq!(body["has_more"], false);

    let (status, body) = app
        .get(&format!("/api/pipeline-runs/{}", mine.id), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, _) = app
        .get(&format!("/api/pipeline-runs/{}", theirs.id), Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_listing_filters_by_pipeline() {
    let (app, runs) = app();
    let me = UserId::new();
    for pipeline in ["echo", "echo", "always_fails"] {
        let mut run = running_run(pipeline, Utc::now(), None);
        run.user_id = Some(me);
        runs.insert(run);
    }
    let token = app.token_for(me);

    let (status, body) = app
        .get("/api/pipeline-runs?pipeline=echo&first=1", Some(&token))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["has_more"], true);
    assert!(body["next_cursor"].is_string());
}

#[tokio::test]
async fn test_empty_chat_message_is_rejected() {
    let (app, _) = app();
    let token = app.token_for(UserId::new());

    let (status, body) = app
        .post_json("/api/assistant/chat", Some(&token), &json!({"message": "   "}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn test_webhooks_disabled_without_secret() {
    let (app, _) = app_with_secret("");
    let body = r#"{"message":"hi"}"#;

    let (status, body) = app
        .send(webhook_request(UserId::new(), "echo", body, Some("sha256=00")))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "unavailable");
}

#[tokio::test]
async fn test_webhook_rejects_bad_or_missing_signature() {
    let (app, runs) = app();
    let user = UserId::new();
    let body = r#"{"message":"hi"}"#;
    let signed_with_wrong_secret = sign_payload("wrong-secret", body.as_bytes()).unwrap();

    let (status, _) = app.send(webhook_request(user, "echo", body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(webhook_request(user, "echo", body, Some(&signed_with_wrong_secret)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signature over a different body
    let signature = sign_payload(TEST_WEBHOOK_SECRET, body.as_bytes()).unwrap();
    let (status, _) = app
        .send(webhook_request(user, "echo", r#"{"message":"tampered"}"#, Some(&signature)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(runs.runs().is_empty());
}

#[tokio::test]
async fn test_signed_webhook_with_malformed_json_is_bad_request() {
    let (app, _) = app();
    let body = "{not json";
    let signature = sign_payload(TEST_WEBHOOK_SECRET, body.as_bytes()).unwrap();

    let (status, _) = app
        .send(webhook_request(UserId::new(), "echo", body, Some(&signature)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
