//! Persistence seam for scheduled tasks.
//!
//! Claiming is the only place the schedule advances: the due rows are locked,
//! planned and moved past `now` in one transaction, so an occurrence is
//! handed to exactly one scheduler instance.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;

use super::cron::CronSchedule;
use super::models::ScheduledTask;
use super::planner::{blocked_by_overlap, plan_firings, FiringPlan};
use crate::common::{PipelineRunId, ScheduledTaskId};
use crate::domains::pipelines::RunStatus;

#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    pub max_catch_up: usize,
    /// How long a `running` last run blocks overlapping firings.
    pub running_lease: Duration,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            max_catch_up: 10,
            running_lease: Duration::hours(1),
        }
    }
}

/// A task claimed for this tick, as it was before the claim.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task: ScheduledTask,
    pub plan: FiringPlan,
    /// Occurrences consumed without firing because the previous run was
    /// still going.
    pub skipped_overlap: usize,
}

impl ClaimedTask {
    /// Last occurrence that actually fires.
    pub fn fired_at(&self) -> Option<DateTime<Utc>> {
        self.plan.fire_times.last().copied()
    }
}

/// Plan a due task. An expression that no longer parses disables the task.
pub fn claim_task(task: ScheduledTask, now: DateTime<Utc>, policy: &ClaimPolicy) -> ClaimedTask {
    let mut plan = match CronSchedule::parse(&task.cron_expression) {
        Ok(schedule) => plan_firings(
            &schedule,
            task.next_run_at,
            now,
            task.misfire_policy,
            policy.max_catch_up,
        ),
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "disabling task with invalid cron expression");
            FiringPlan {
                fire_times: Vec::new(),
                next_run_at: None,
                dropped: 0,
            }
        }
    };

    let mut skipped_overlap = 0;
    if !plan.is_idle() && blocked_by_overlap(&task, now, policy.running_lease) {
        skipped_overlap = plan.fire_times.len();
        plan.fire_times.clear();
    }

    ClaimedTask {
        task,
        plan,
        skipped_overlap,
    }
}

#[async_trait]
pub trait ScheduledTaskStore: Send + Sync {
    /// Claim up to `limit` enabled tasks due at `now`, advancing each past
    /// `now` before returning it.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<ClaimedTask>>;

    /// Remember the outcome of the task's latest firing.
    async fn record_run(
        &self,
        id: ScheduledTaskId,
        run_id: Option<PipelineRunId>,
        status: RunStatus,
    ) -> Result<()>;

    /// Remember a firing made outside the schedule, unless a scheduled
    /// firing is still `running`. Returns whether the task was updated.
    async fn record_manual_run(
        &self,
        id: ScheduledTaskId,
        run_id: PipelineRunId,
        status: RunStatus,
    ) -> Result<bool>;

    async fn find(&self, id: ScheduledTaskId) -> Result<Option<ScheduledTask>>;
}

pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledTaskStore for PostgresTaskStore {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<ClaimedTask>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin claim transaction")?;

        let due = ScheduledTask::lock_due(now, limit, &mut tx).await?;
        let mut claimed = Vec::with_capacity(due.len());
        for task in due {
            let claim = claim_task(task, now, policy);
            ScheduledTask::advance(claim.task.id, claim.plan.next_run_at, claim.fired_at(), &mut tx)
                .await?;
            claimed.push(claim);
        }

        tx.commit().await.context("Failed to commit task claims")?;
        Ok(claimed)
    }

    async fn record_run(
        &self,
        id: ScheduledTaskId,
        run_id: Option<PipelineRunId>,
        status: RunStatus,
    ) -> Result<()> {
        ScheduledTask::record_run(id, run_id, status, &self.pool).await
    }

    async fn record_manual_run(
        &self,
        id: ScheduledTaskId,
        run_id: PipelineRunId,
        status: RunStatus,
    ) -> Result<bool> {
        ScheduledTask::record_run_unless_running(id, run_id, status, &self.pool).await
    }

    async fn find(&self, id: ScheduledTaskId) -> Result<Option<ScheduledTask>> {
        ScheduledTask::find_by_id(id, &self.pool).await
    }
}
