//! `/api/pipelines` and `/api/pipeline-runs`.
//!
//! A pipeline that fails still answers 200: the failure is on the returned
//! run record. Only rejections before a run exists map to 4xx.

use axum::extract::{Extension, Path, Query};
use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::common::{Page, PageParams, PipelineRunId, ScheduledTaskId};
use crate::domains::pipelines::{
    InvokeRequest, PipelineDescriptor, PipelineRunData, RunFilter, RunStatus, TriggerSource,
};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::{ensure_user, idempotency_key};

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run: PipelineRunData,
    pub replayed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    pub pipeline: Option<String>,
    pub status: Option<RunStatus>,
    pub trigger: Option<TriggerSource>,
    pub scheduled_task_id: Option<ScheduledTaskId>,
}

/// Request body as pipeline input. Blank bodies are `{}`.
pub(crate) fn parse_input(body: &[u8]) -> Result<serde_json::Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
}

pub async fn list_pipelines(
    Extension(state): Extension<AxumAppState>,
    _auth: AuthUser,
) -> Json<Vec<PipelineDescriptor>> {
    Json(state.registry.describe())
}

/// Run a pipeline for the caller. Body is the pipeline input; an empty body
/// means `{}`.
pub async fn run_pipeline(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    if !state.registry.contains(&name) {
        return Err(ApiError::NotFound(format!("unknown pipeline: {}", name)));
    }
    ensure_user(&auth, &state.db_pool).await?;

    let input = parse_input(&body)?;
    let request = InvokeRequest::builder()
        .pipeline(name)
        .input(input)
        .user_id(Some(auth.user_id))
        .trigger(TriggerSource::Api)
        .idempotency_key(idempotency_key(&headers).map(|k| format!("api:{}:{}", auth.user_id, k)))
        .build();

    let outcome = state.registry.invoke(request, &state.deps).await?;
    Ok(Json(RunResponse {
        run: outcome.run.into(),
        replayed: outcome.replayed,
    }))
}

pub async fn list_runs(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Query(query): Query<RunQuery>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<PipelineRunData>>, ApiError> {
    let page = params
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let filter = RunFilter {
        user_id: Some(auth.user_id),
        pipeline: query.pipeline,
        status: query.status,
        trigger: query.trigger,
        scheduled_task_id: query.scheduled_task_id,
    };

    let rows = state.deps.run_store.list(&filter, &page).await?;
    Ok(Json(
        Page::from_rows(rows, &page, |run| run.id.into_uuid()).map(PipelineRunData::from),
    ))
}

pub async fn get_run(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<PipelineRunId>,
) -> Result<Json<PipelineRunData>, ApiError> {
    state
        .deps
        .run_store
        .find(id)
        .await?
        .filter(|run| run.user_id == Some(auth.user_id))
        .map(|run| Json(run.into()))
        .ok_or_else(|| ApiError::not_found("pipeline run"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_body_is_empty_object() {
        assert_eq!(parse_input(b"").unwrap(), serde_json::json!({}));
        assert_eq!(parse_input(b"  \n").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let err = parse_input(b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_body_passes_through() {
        assert_eq!(
            parse_input(br#"{"limit": 5}"#).unwrap(),
            serde_json::json!({"limit": 5})
        );
    }
}
