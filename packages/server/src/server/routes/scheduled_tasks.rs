//! `/api/scheduled-tasks`: cron schedules that fire pipelines.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;

use crate::common::ScheduledTaskId;
use crate::domains::scheduling::{
    create_task, trigger_now, update_task, ScheduledTask, ScheduledTaskData, ScheduledTaskInput,
    ScheduledTaskUpdate,
};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;
use crate::server::routes::pipelines::RunResponse;

async fn load_task(
    state: &AxumAppState,
    auth: &AuthUser,
    id: ScheduledTaskId,
) -> Result<ScheduledTask, ApiError> {
    ScheduledTask::find_for_user(id, auth.user_id, &state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("scheduled task"))
}

pub async fn list_tasks(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ScheduledTaskData>>, ApiError> {
    let tasks = ScheduledTask::list_for_user(auth.user_id, &state.db_pool).await?;
    Ok(Json(tasks.into_iter().map(ScheduledTaskData::from).collect()))
}

pub async fn create_scheduled_task(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(input): Json<ScheduledTaskInput>,
) -> Result<(StatusCode, Json<ScheduledTaskData>), ApiError> {
    ensure_user(&auth, &state.db_pool).await?;
    let task = create_task(auth.user_id, input, &state.registry, &state.deps).await?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

pub async fn get_task(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ScheduledTaskId>,
) -> Result<Json<ScheduledTaskData>, ApiError> {
    let task = load_task(&state, &auth, id).await?;
    Ok(Json(task.into()))
}

pub async fn update_scheduled_task(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ScheduledTaskId>,
    Json(update): Json<ScheduledTaskUpdate>,
) -> Result<Json<ScheduledTaskData>, ApiError> {
    let task = load_task(&state, &auth, id).await?;
    let task = update_task(task, update, &state.registry, &state.deps).await?;
    Ok(Json(task.into()))
}

pub async fn delete_task(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ScheduledTaskId>,
) -> Result<StatusCode, ApiError> {
    if ScheduledTask::delete(id, auth.user_id, &state.db_pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("scheduled task"))
    }
}

/// Fire the task's pipeline once, now. The schedule is not moved.
pub async fn trigger_task(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ScheduledTaskId>,
) -> Result<Json<RunResponse>, ApiError> {
    let task = load_task(&state, &auth, id).await?;
    let outcome = trigger_now(&task, &state.registry, &state.deps).await?;
    Ok(Json(RunResponse {
        run: outcome.run.into(),
        replayed: outcome.replayed,
    }))
}
