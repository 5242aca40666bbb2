use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::common::UserId;
use crate::domains::pipelines::{
    InvokeOutcome, InvokeRequest, PipelineError, PipelineRegistry, TriggerSource,
};
use crate::domains::scheduling::cron::{CronError, CronSchedule};
use crate::domains::scheduling::models::{
    NewScheduledTask, ScheduledTask, ScheduledTaskInput, ScheduledTaskUpdate,
};
use crate::kernel::ServerDeps;

/// A task definition that cannot be scheduled.
#[derive(Debug, Error)]
pub enum TaskValidationError {
    #[error("task name must not be empty")]
    EmptyName,

    #[error(transparent)]
    Cron(#[from] CronError),

    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("cron expression {0:?} never fires again")]
    NoUpcomingOccurrence(String),

    #[error("task input must be a JSON object")]
    InputNotObject,

    #[error("invalid input for {pipeline}: {reason}")]
    InvalidInput { pipeline: String, reason: String },
}

fn validate(
    name: &str,
    cron_expression: &str,
    pipeline_name: &str,
    input: &serde_json::Value,
    registry: &PipelineRegistry,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TaskValidationError> {
    if name.trim().is_empty() {
        return Err(TaskValidationError::EmptyName);
    }
    if !input.is_object() {
        return Err(TaskValidationError::InputNotObject);
    }
    let pipeline = registry
        .get(pipeline_name)
        .ok_or_else(|| TaskValidationError::UnknownPipeline(pipeline_name.to_string()))?;
    pipeline
        .validate(input)
        .map_err(|reason| TaskValidationError::InvalidInput {
            pipeline: pipeline_name.to_string(),
            reason,
        })?;
    let schedule = CronSchedule::parse(cron_expression)?;
    schedule
        .next_after(now)
        .ok_or_else(|| TaskValidationError::NoUpcomingOccurrence(cron_expression.to_string()))
}

pub async fn create_task(
    user_id: UserId,
    input: ScheduledTaskInput,
    registry: &PipelineRegistry,
    deps: &ServerDeps,
) -> Result<ScheduledTask> {
    let next_run_at = validate(
        &input.name,
        &input.cron_expression,
        &input.pipeline_name,
        &input.input,
        registry,
        Utc::now(),
    )?;

    let new_task = NewScheduledTask::builder()
        .user_id(user_id)
        .name(input.name.trim())
        .cron_expression(input.cron_expression.trim())
        .pipeline_name(input.pipeline_name)
        .input(input.input)
        .enabled(input.enabled)
        .misfire_policy(input.misfire_policy)
        .overlap_policy(input.overlap_policy)
        .next_run_at(next_run_at)
        .build();

    let task = ScheduledTask::create(&new_task, &deps.db_pool).await?;
    info!(task_id = %task.id, pipeline = %task.pipeline_name, next_run_at = %task.next_run_at, "scheduled task created");
    Ok(task)
}

/// Apply a partial update. The next run is recomputed from now when the
/// expression changes or the task is re-enabled.
pub async fn update_task(
    mut task: ScheduledTask,
    update: ScheduledTaskUpdate,
    registry: &PipelineRegistry,
    deps: &ServerDeps,
) -> Result<ScheduledTask> {
    let reschedule = update
        .cron_expression
        .as_deref()
        .is_some_and(|expr| expr.trim() != task.cron_expression)
        || (update.enabled == Some(true) && !task.enabled);

    if let Some(name) = update.name {
        task.name = name.trim().to_string();
    }
    if let Some(expr) = update.cron_expression {
        task.cron_expression = expr.trim().to_string();
    }
    if let Some(pipeline) = update.pipeline_name {
        task.pipeline_name = pipeline;
    }
    if let Some(input) = update.input {
        task.input = input;
    }
    if let Some(enabled) = update.enabled {
        task.enabled = enabled;
    }
    if let Some(policy) = update.misfire_policy {
        task.misfire_policy = policy;
    }
    if let Some(policy) = update.overlap_policy {
        task.overlap_policy = policy;
    }

    let next_run_at = validate(
        &task.name,
        &task.cron_expression,
        &task.pipeline_name,
        &task.input,
        registry,
        Utc::now(),
    )?;
    if reschedule {
        task.next_run_at = next_run_at;
    }

    ScheduledTask::save(&task, &deps.db_pool).await
}

/// Fire a task once, now, outside its schedule.
///
/// The task's last-run fields are left alone while a scheduled firing is
/// still running, so overlap `skip` keeps seeing it.
pub async fn trigger_now(
    task: &ScheduledTask,
    registry: &PipelineRegistry,
    deps: &Arc<ServerDeps>,
) -> Result<InvokeOutcome, PipelineError> {
    let request = InvokeRequest::builder()
        .pipeline(task.pipeline_name.clone())
        .input(task.input.clone())
        .user_id(Some(task.user_id))
        .trigger(TriggerSource::Api)
        .scheduled_task_id(Some(task.id))
        .build();

    let outcome = registry.invoke(request, deps).await?;
    match deps
        .task_store
        .record_manual_run(task.id, outcome.run.id, outcome.run.status)
        .await
    {
        Ok(true) => {}
        Ok(false) => debug!(task_id = %task.id, "scheduled firing in progress, task status kept"),
        Err(e) => warn!(task_id = %task.id, error = %e, "failed to record manual run on task"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::pipelines::build_pipeline_registry;

    #[test]
    fn test_validate_accepts_known_pipeline() {
        let registry = build_pipeline_registry();
        let now = Utc::now();
        let next = validate(
            "digest",
            "0 8 * * *",
            "daily_digest",
            &serde_json::json!({}),
            &registry,
            now,
        )
        .unwrap();
        assert!(next > now);
    }

    #[test]
    fn test_validate_rejects_bad_definitions() {
        let registry = build_pipeline_registry();
        let now = Utc::now();
        let empty = serde_json::json!({});

        assert!(matches!(
            validate("x", "0 8 * * *", "nope", &empty, &registry, now),
            Err(TaskValidationError::UnknownPipeline(_))
        ));
        assert!(matches!(
            validate("x", "not cron", "daily_digest", &empty, &registry, now),
            Err(TaskValidationError::Cron(_))
        ));
        assert!(matches!(
            validate(" ", "0 8 * * *", "daily_digest", &empty, &registry, now),
            Err(TaskValidationError::EmptyName)
        ));
        assert!(matches!(
            validate("x", "0 8 * * *", "daily_digest", &serde_json::json!([1]), &registry, now),
            Err(TaskValidationError::InputNotObject)
        ));
        assert!(matches!(
            validate("x", "0 8 * * *", "daily_digest", &serde_json::json!({"min_score": "high"}), &registry, now),
            Err(TaskValidationError::InvalidInput { .. })
        ));
        assert!(matches!(
            validate("x", "0 0 0 1 1 * 2020", "daily_digest", &empty, &registry, now),
            Err(TaskValidationError::NoUpcomingOccurrence(_))
        ));
    }
}
