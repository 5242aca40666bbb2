use anyhow::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use typed_builder::TypedBuilder;

use crate::common::{PipelineRunId, ScheduledTaskId, UserId};
use crate::domains::pipelines::RunStatus;

/// What to do with occurrences missed while no scheduler was running.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, sqlx::Type,
)]
#[sqlx(type_name = "misfire_policy", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// Fire once, for the latest missed occurrence.
    #[default]
    SkipToLatest,
    /// Fire each missed occurrence, up to the scheduler's cap.
    CatchUp,
}

/// Whether an occurrence may fire while the previous run is still going.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, sqlx::Type,
)]
#[sqlx(type_name = "overlap_policy", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    #[default]
    Skip,
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ScheduledTask {
    pub id: ScheduledTaskId,
    pub user_id: UserId,
    pub name: String,
    pub cron_expression: String,
    pub pipeline_name: String,
    pub input: serde_json::Value,
    pub enabled: bool,
    pub misfire_policy: MisfirePolicy,
    pub overlap_policy: OverlapPolicy,
    pub next_run_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<PipelineRunId>,
    pub last_run_status: Option<RunStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a task.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledTaskInput {
    pub name: String,
    pub cron_expression: String,
    pub pipeline_name: String,
    #[serde(default = "empty_object")]
    pub input: serde_json::Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub misfire_policy: MisfirePolicy,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn enabled_by_default() -> bool {
    true
}

/// Partial update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduledTaskUpdate {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub pipeline_name: Option<String>,
    pub input: Option<serde_json::Value>,
    pub enabled: Option<bool>,
    pub misfire_policy: Option<MisfirePolicy>,
    pub overlap_policy: Option<OverlapPolicy>,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct NewScheduledTask {
    #[builder(default = ScheduledTaskId::new())]
    pub id: ScheduledTaskId,
    pub user_id: UserId,
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub cron_expression: String,
    #[builder(setter(into))]
    pub pipeline_name: String,
    #[builder(default = serde_json::json!({}))]
    pub input: serde_json::Value,
    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default)]
    pub misfire_policy: MisfirePolicy,
    #[builder(default)]
    pub overlap_policy: OverlapPolicy,
    pub next_run_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub async fn create(task: &NewScheduledTask, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO scheduled_tasks (
                id, user_id, name, cron_expression, pipeline_name, input,
                enabled, misfire_policy, overlap_policy, next_run_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(task.id)
        .bind(task.user_id)
        .bind(&task.name)
        .bind(&task.cron_expression)
        .bind(&task.pipeline_name)
        .bind(&task.input)
        .bind(task.enabled)
        .bind(task.misfire_policy)
        .bind(task.overlap_policy)
        .bind(task.next_run_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: ScheduledTaskId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduled_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_for_user(
        id: ScheduledTaskId,
        user_id: UserId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduled_tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_for_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_tasks WHERE user_id = $1 ORDER BY name, id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Every task, soonest first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduled_tasks ORDER BY next_run_at, id")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Overwrite the editable columns with `task`'s values.
    pub async fn save(task: &ScheduledTask, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE scheduled_tasks
            SET name = $2,
                cron_expression = $3,
                pipeline_name = $4,
                input = $5,
                enabled = $6,
                misfire_policy = $7,
                overlap_policy = $8,
                next_run_at = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.cron_expression)
        .bind(&task.pipeline_name)
        .bind(&task.input)
        .bind(task.enabled)
        .bind(task.misfire_policy)
        .bind(task.overlap_policy)
        .bind(task.next_run_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(id: ScheduledTaskId, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lock up to `limit` enabled tasks due at `now`. Rows another
    /// transaction holds are skipped.
    pub async fn lock_due(
        now: DateTime<Utc>,
        limit: i64,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM scheduled_tasks
            WHERE enabled AND next_run_at <= $1
            ORDER BY next_run_at, id
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
        .map_err(Into::into)
    }

    /// Advance a claimed task past the occurrences being handled.
    ///
    /// A firing task is marked `running` here, before its run row exists.
    /// If the process dies before the firing is recorded, the status stays
    /// `running` with no run behind it; overlap `skip` then holds the task
    /// back until the running lease on `last_fired_at` expires. The claimed
    /// occurrences are not retried.
    pub async fn advance(
        id: ScheduledTaskId,
        next_run_at: Option<DateTime<Utc>>,
        fired_at: Option<DateTime<Utc>>,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET next_run_at = COALESCE($2, next_run_at),
                enabled = enabled AND $2 IS NOT NULL,
                last_fired_at = COALESCE($3, last_fired_at),
                last_run_status = CASE WHEN $3 IS NULL THEN last_run_status ELSE 'running' END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_run_at)
        .bind(fired_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn record_run(
        id: ScheduledTaskId,
        run_id: Option<PipelineRunId>,
        status: RunStatus,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET last_run_id = COALESCE($2, last_run_id),
                last_run_status = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(run_id)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn record_run_unless_running(
        id: ScheduledTaskId,
        run_id: PipelineRunId,
        status: RunStatus,
        pool: &PgPool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET last_run_id = $2,
                last_run_status = $3,
                updated_at = NOW()
            WHERE id = $1
              AND last_run_status IS DISTINCT FROM 'running'
            "#,
        )
        .bind(id)
        .bind(run_id)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
