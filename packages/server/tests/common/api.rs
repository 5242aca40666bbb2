//! Router-level helpers: build the app over test dependencies and send
//! requests through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use jobtrack_core::common::UserId;
use jobtrack_core::domains::pipelines::PipelineRegistry;
use jobtrack_core::kernel::ServerDeps;
use jobtrack_core::server::{build_router, AxumAppState};

pub const TEST_WEBHOOK_SECRET: &str = "webhook-test-secret";

pub struct TestApp {
    pub router: Router,
    pub deps: Arc<ServerDeps>,
}

impl TestApp {
    pub fn new(deps: Arc<ServerDeps>, registry: Arc<PipelineRegistry>, webhook_secret: &str) -> Self {
        let state = AxumAppState::new(deps.clone(), registry, webhook_secret);
        Self {
            router: build_router(state, &[]),
            deps,
        }
    }

    /// Bearer token for `user_id`, signed with the test secret.
    pub fn token_for(&self, user_id: UserId) -> String {
        self.deps
            .jwt_service
            .create_token(user_id, format!("{}@example.com", user_id))
            .expect("token")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: &Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }
}
