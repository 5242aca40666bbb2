//! Database-backed cron scheduler.
//!
//! ```text
//! Scheduler::run
//!     │  every poll_interval, until shutdown
//!     └─► spawn tick(now) into a JoinSet
//!             ├─► PipelineRegistry::recover_interrupted_runs
//!             ├─► ScheduledTaskStore::claim_due   (lock, plan, advance)
//!             └─► PipelineRegistry::invoke        (one per fired occurrence)
//!     on shutdown: stop polling, drain the JoinSet
//! ```
//!
//! Each firing carries the idempotency key `schedule:<task id>:<unix secs>`,
//! so an occurrence that somehow reaches two schedulers still runs once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::store::{ClaimPolicy, ClaimedTask};
use crate::common::ScheduledTaskId;
use crate::domains::pipelines::{
    InvokeRequest, PipelineError, RunStatus, SharedPipelineRegistry, TriggerSource,
};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum tasks claimed per tick
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Cap on missed occurrences fired for a `catch_up` task
    pub max_catch_up: usize,
    /// How long a `running` last run blocks `skip`-overlap tasks
    pub running_lease: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            poll_interval: Duration::from_secs(15),
            max_catch_up: 10,
            running_lease: chrono::Duration::hours(1),
        }
    }
}

impl SchedulerConfig {
    fn claim_policy(&self) -> ClaimPolicy {
        ClaimPolicy {
            max_catch_up: self.max_catch_up,
            running_lease: self.running_lease,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub claimed: usize,
    pub fired: usize,
    pub skipped_overlap: usize,
    pub dropped_misfires: usize,
    /// Occurrences already handled under their idempotency key.
    pub deduplicated: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Firings that could not start a run.
    pub errors: usize,
}

impl TickReport {
    fn merge(&mut self, other: &TickReport) {
        self.claimed += other.claimed;
        self.fired += other.fired;
        self.skipped_overlap += other.skipped_overlap;
        self.dropped_misfires += other.dropped_misfires;
        self.deduplicated += other.deduplicated;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors += other.errors;
    }
}

/// Idempotency key of one scheduled occurrence.
pub fn occurrence_key(task_id: ScheduledTaskId, occurrence: DateTime<Utc>) -> String {
    format!("schedule:{}:{}", task_id, occurrence.timestamp())
}

#[derive(Clone)]
pub struct Scheduler {
    registry: SharedPipelineRegistry,
    deps: Arc<ServerDeps>,
    config: SchedulerConfig,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(registry: SharedPipelineRegistry, deps: Arc<ServerDeps>) -> Self {
        Self::with_config(registry, deps, SchedulerConfig::default())
    }

    pub fn with_config(
        registry: SharedPipelineRegistry,
        deps: Arc<ServerDeps>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            deps,
            config,
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Stop `run` from polling. Shared by every clone of this scheduler.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run the poll loop on its own task.
    pub fn spawn(self) -> SchedulerHandle {
        let scheduler = self.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(error = %format!("{:#}", e), "scheduler exited with error");
            }
        });
        SchedulerHandle { scheduler, task }
    }

    /// Claim due tasks and fire their occurrences. Tasks fire concurrently;
    /// the occurrences of one task fire in order.
    #[tracing::instrument(skip_all, fields(now = %now))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        // Runs orphaned by a crashed peer would otherwise hold their keys
        if let Err(e) = self.registry.recover_interrupted_runs(&self.deps).await {
            warn!(error = %format!("{:#}", e), "failed to recover interrupted runs");
        }

        let claims = self
            .deps
            .task_store
            .claim_due(now, self.config.batch_size, &self.config.claim_policy())
            .await?;

        let mut report = TickReport {
            claimed: claims.len(),
            ..Default::default()
        };
        if claims.is_empty() {
            return Ok(report);
        }

        for claim in &claims {
            report.skipped_overlap += claim.skipped_overlap;
            report.dropped_misfires += claim.plan.dropped;
            if claim.skipped_overlap > 0 {
                info!(
                    task_id = %claim.task.id,
                    skipped = claim.skipped_overlap,
                    "previous run still in progress, skipping occurrence"
                );
            }
            if claim.plan.next_run_at.is_none() {
                info!(task_id = %claim.task.id, "schedule exhausted, task disabled");
            }
        }

        let firings = claims
            .into_iter()
            .filter(|claim| !claim.plan.is_idle())
            .map(|claim| self.fire(claim));
        for outcome in join_all(firings).await {
            report.merge(&outcome);
        }

        debug!(
            claimed = report.claimed,
            fired = report.fired,
            failed = report.failed,
            "scheduler tick finished"
        );
        Ok(report)
    }

    async fn fire(&self, claim: ClaimedTask) -> TickReport {
        let task = &claim.task;
        let mut report = TickReport::default();

        for occurrence in &claim.plan.fire_times {
            let request = InvokeRequest::builder()
                .pipeline(task.pipeline_name.clone())
                .input(task.input.clone())
                .user_id(Some(task.user_id))
                .trigger(TriggerSource::Schedule)
                .idempotency_key(Some(occurrence_key(task.id, *occurrence)))
                .scheduled_task_id(Some(task.id))
                .scheduled_for(Some(*occurrence))
                .build();

            let recorded = match self.registry.invoke(request, &self.deps).await {
                Ok(outcome) if outcome.replayed => {
                    report.deduplicated += 1;
                    continue;
                }
                Ok(outcome) => {
                    report.fired += 1;
                    match outcome.run.status {
                        RunStatus::Succeeded => report.succeeded += 1,
                        _ => report.failed += 1,
                    }
                    (Some(outcome.run.id), outcome.run.status)
                }
                Err(PipelineError::AlreadyRunning { run_id, .. }) => {
                    debug!(task_id = %task.id, run_id = %run_id, "occurrence already running elsewhere");
                    report.deduplicated += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        task_id = %task.id,
                        pipeline = %task.pipeline_name,
                        error = %e,
                        "scheduled firing could not start"
                    );
                    report.errors += 1;
                    (None, RunStatus::Failed)
                }
            };

            if let Err(e) = self
                .deps
                .task_store
                .record_run(task.id, recorded.0, recorded.1)
                .await
            {
                warn!(task_id = %task.id, error = %e, "failed to record scheduled run");
            }
        }

        report
    }

    /// Poll until shutdown is requested, then wait for in-flight ticks.
    ///
    /// Each tick runs on its own task so a slow pipeline does not hold up the
    /// next poll. A claimed occurrence is committed before it fires, so ticks
    /// are drained rather than dropped.
    pub async fn run(self) -> Result<()> {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "scheduler starting"
        );

        let mut shutdown = self.shutdown.subscribe();
        let mut ticks: JoinSet<Result<TickReport>> = JoinSet::new();

        while !*shutdown.borrow_and_update() {
            while let Some(joined) = ticks.try_join_next() {
                log_tick(joined);
            }

            let scheduler = self.clone();
            ticks.spawn(async move { scheduler.tick(Utc::now()).await });

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        if !ticks.is_empty() {
            info!(in_flight = ticks.len(), "scheduler draining in-flight ticks");
        }
        while let Some(joined) = ticks.join_next().await {
            log_tick(joined);
        }

        info!("scheduler stopped");
        Ok(())
    }
}

fn log_tick(joined: Result<Result<TickReport>, JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %format!("{:#}", e), "scheduler tick failed"),
        Err(e) => error!(error = %e, "scheduler tick panicked"),
    }
}

/// A scheduler polling on a background task.
pub struct SchedulerHandle {
    scheduler: Scheduler,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn request_shutdown(&self) {
        self.scheduler.request_shutdown();
    }

    /// Stop polling and wait until every in-flight firing has been recorded.
    pub async fn shutdown(self) {
        self.scheduler.request_shutdown();
        if let Err(e) = self.task.await {
            error!(error = %e, "scheduler task panicked");
        }
    }
}
