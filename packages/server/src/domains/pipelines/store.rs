//! Persistence seam for pipeline runs.
//!
//! The registry only talks to [`PipelineRunStore`]; production uses
//! [`PostgresRunStore`], tests use the in-memory store from
//! `kernel::test_dependencies`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::{NewPipelineRun, PipelineRun, RunFilter, RunOutcome};
use crate::common::{PipelineRunId, ValidatedPage};

/// Result of trying to open a run.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(PipelineRun),
    /// A live run already holds the idempotency key.
    KeyConflict,
}

#[async_trait]
pub trait PipelineRunStore: Send + Sync {
    /// Insert a `running` run. Returns `KeyConflict` when another running or
    /// succeeded run of the same pipeline holds the idempotency key.
    async fn start(&self, run: NewPipelineRun) -> Result<StartOutcome>;

    /// Close a run with its outcome, stamping `finished_at` and `duration_ms`.
    async fn finish(&self, id: PipelineRunId, outcome: RunOutcome) -> Result<PipelineRun>;

    /// The running or succeeded run holding `key`, if any.
    async fn find_by_idempotency_key(&self, pipeline: &str, key: &str)
        -> Result<Option<PipelineRun>>;

    async fn find(&self, id: PipelineRunId) -> Result<Option<PipelineRun>>;

    /// Newest first, with one look-ahead row.
    async fn list(&self, filter: &RunFilter, page: &ValidatedPage) -> Result<Vec<PipelineRun>>;

    /// Record that a running run is still alive.
    async fn heartbeat(&self, id: PipelineRunId) -> Result<()>;

    /// Fail runs still `running` whose last heartbeat is before
    /// `heartbeat_before`.
    async fn fail_interrupted(&self, heartbeat_before: DateTime<Utc>) -> Result<u64>;

    /// Delete finished runs older than `cutoff`.
    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl PipelineRunStore for PostgresRunStore {
    async fn start(&self, run: NewPipelineRun) -> Result<StartOutcome> {
        match PipelineRun::insert(&run, &self.pool).await {
            Ok(run) => Ok(StartOutcome::Started(run)),
            Err(e) if run.idempotency_key.is_some() && is_unique_violation(&e) => {
                Ok(StartOutcome::KeyConflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn finish(&self, id: PipelineRunId, outcome: RunOutcome) -> Result<PipelineRun> {
        PipelineRun::finish(id, &outcome, &self.pool).await
    }

    async fn find_by_idempotency_key(
        &self,
        pipeline: &str,
        key: &str,
    ) -> Result<Option<PipelineRun>> {
        PipelineRun::find_by_idempotency_key(pipeline, key, &self.pool).await
    }

    async fn find(&self, id: PipelineRunId) -> Result<Option<PipelineRun>> {
        PipelineRun::find_by_id(id, &self.pool).await
    }

    async fn list(&self, filter: &RunFilter, page: &ValidatedPage) -> Result<Vec<PipelineRun>> {
        PipelineRun::list(filter, page, &self.pool).await
    }

    async fn heartbeat(&self, id: PipelineRunId) -> Result<()> {
        PipelineRun::touch_heartbeat(id, &self.pool).await
    }

    async fn fail_interrupted(&self, heartbeat_before: DateTime<Utc>) -> Result<u64> {
        PipelineRun::fail_interrupted(heartbeat_before, &self.pool).await
    }

    async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        PipelineRun::delete_finished_before(cutoff, &self.pool).await
    }
}
