use anyhow::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::{PipelineRunId, ScheduledTaskId, UserId, ValidatedPage};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, sqlx::Type,
)]
#[sqlx(type_name = "pipeline_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// What started a pipeline run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, sqlx::Type,
)]
#[sqlx(type_name = "trigger_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Api,
    Webhook,
    Agent,
    Schedule,
    Cli,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerSource::Api => "api",
            TriggerSource::Webhook => "webhook",
            TriggerSource::Agent => "agent",
            TriggerSource::Schedule => "schedule",
            TriggerSource::Cli => "cli",
        };
        f.write_str(name)
    }
}

/// Audit record of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PipelineRun {
    pub id: PipelineRunId,
    pub user_id: Option<UserId>,
    pub pipeline_name: String,
    pub trigger: TriggerSource,
    pub status: RunStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub idempotency_key: Option<String>,
    pub scheduled_task_id: Option<ScheduledTaskId>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Touched periodically while the run executes.
    pub heartbeat_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct NewPipelineRun {
    #[builder(default = PipelineRunId::new())]
    pub id: PipelineRunId,
    #[builder(setter(into))]
    pub pipeline_name: String,
    pub trigger: TriggerSource,
    #[builder(default)]
    pub user_id: Option<UserId>,
    #[builder(default = serde_json::json!({}))]
    pub input: serde_json::Value,
    #[builder(default)]
    pub idempotency_key: Option<String>,
    #[builder(default)]
    pub scheduled_task_id: Option<ScheduledTaskId>,
    #[builder(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunFilter {
    pub user_id: Option<UserId>,
    pub pipeline: Option<String>,
    pub status: Option<RunStatus>,
    pub trigger: Option<TriggerSource>,
    pub scheduled_task_id: Option<ScheduledTaskId>,
}

impl RunFilter {
    pub fn matches(&self, run: &PipelineRun) -> bool {
        self.user_id.map_or(true, |u| run.user_id == Some(u))
            && self.pipeline.as_deref().map_or(true, |p| run.pipeline_name == p)
            && self.status.map_or(true, |s| run.status == s)
            && self.trigger.map_or(true, |t| run.trigger == t)
            && self
                .scheduled_task_id
                .map_or(true, |t| run.scheduled_task_id == Some(t))
    }
}

impl PipelineRun {
    pub async fn insert(run: &NewPipelineRun, pool: &PgPool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO pipeline_runs (
                id, user_id, pipeline_name, trigger, status, input,
                idempotency_key, scheduled_task_id, scheduled_for
            )
            VALUES ($1, $2, $3, $4, 'running', $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(run.id)
        .bind(run.user_id)
        .bind(&run.pipeline_name)
        .bind(run.trigger)
        .bind(&run.input)
        .bind(run.idempotency_key.as_deref())
        .bind(run.scheduled_task_id)
        .bind(run.scheduled_for)
        .fetch_one(pool)
        .await
    }

    pub async fn finish(id: PipelineRunId, outcome: &RunOutcome, pool: &PgPool) -> Result<Self> {
        let (status, output, error) = match outcome {
            RunOutcome::Succeeded(output) => (RunStatus::Succeeded, Some(output), None),
            RunOutcome::Failed(error) => (RunStatus::Failed, None, Some(error.as_str())),
        };

        sqlx::query_as::<_, Self>(
            r#"
            UPDATE pipeline_runs
            SET status = $2,
                output = $3,
                error = $4,
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(output)
        .bind(error)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: PipelineRunId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM pipeline_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// The live (running or succeeded) run holding an idempotency key.
    pub async fn find_by_idempotency_key(
        pipeline_name: &str,
        key: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pipeline_runs
            WHERE pipeline_name = $1
              AND idempotency_key = $2
              AND status IN ('running', 'succeeded')
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(pipeline_name)
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Newest first, with one look-ahead row.
    pub async fn list(filter: &RunFilter, page: &ValidatedPage, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pipeline_runs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR pipeline_name = $2)
              AND ($3::pipeline_run_status IS NULL OR status = $3)
              AND ($4::trigger_source IS NULL OR trigger = $4)
              AND ($5::uuid IS NULL OR scheduled_task_id = $5)
              AND ($6::uuid IS NULL OR id < $6)
            ORDER BY id DESC
            LIMIT $7
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.pipeline.as_deref())
        .bind(filter.status)
        .bind(filter.trigger)
        .bind(filter.scheduled_task_id)
        .bind(page.after)
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn touch_heartbeat(id: PipelineRunId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_runs SET heartbeat_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark running runs whose last heartbeat is older than `heartbeat_before`
    /// as failed.
    pub async fn fail_interrupted(heartbeat_before: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = 'failed',
                error = 'interrupted',
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT,
                updated_at = NOW()
            WHERE status = 'running' AND heartbeat_at < $1
            "#,
        )
        .bind(heartbeat_before)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_finished_before(cutoff: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM pipeline_runs WHERE status <> 'running' AND finished_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
