//! Named pipeline registry and the single invocation path every trigger uses.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use super::data::{PipelineRunData, RunEvent};
use super::error::PipelineError;
use super::models::{NewPipelineRun, PipelineRun, RunOutcome, RunStatus, TriggerSource};
use super::pipeline::{ErasedPipeline, Pipeline, PipelineContext, PipelineDescriptor};
use super::store::StartOutcome;
use crate::common::{ScheduledTaskId, UserId};
use crate::kernel::{user_topic, ServerDeps, SYSTEM_TOPIC};

pub type SharedPipelineRegistry = Arc<PipelineRegistry>;

/// How often an executing run touches its heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// A running run whose heartbeat is older than this has lost its process.
pub const HEARTBEAT_STALE_AFTER: Duration = Duration::from_secs(30);

fn heartbeat_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::seconds(HEARTBEAT_STALE_AFTER.as_secs() as i64)
}

/// One request to run a pipeline, from any trigger.
#[derive(Debug, Clone, TypedBuilder)]
pub struct InvokeRequest {
    #[builder(setter(into))]
    pub pipeline: String,
    #[builder(default = serde_json::json!({}))]
    pub input: serde_json::Value,
    #[builder(default)]
    pub user_id: Option<UserId>,
    pub trigger: TriggerSource,
    #[builder(default)]
    pub idempotency_key: Option<String>,
    #[builder(default)]
    pub scheduled_task_id: Option<ScheduledTaskId>,
    #[builder(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub run: PipelineRun,
    /// The run is an earlier success returned for a repeated idempotency key.
    pub replayed: bool,
}

#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<&'static str, Arc<dyn ErasedPipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline under its `NAME`. A later registration with the
    /// same name replaces the earlier one.
    pub fn register<P: Pipeline>(&mut self, pipeline: P) -> &mut Self {
        if self.pipelines.insert(P::NAME, Arc::new(pipeline)).is_some() {
            warn!(pipeline = P::NAME, "pipeline registered twice, keeping the latest");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ErasedPipeline>> {
        self.pipelines.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.pipelines.keys().copied().collect()
    }

    /// Descriptors sorted by name.
    pub fn describe(&self) -> Vec<PipelineDescriptor> {
        self.pipelines.values().map(|p| p.descriptor()).collect()
    }

    /// Longest timeout of any registered pipeline.
    pub fn max_timeout(&self) -> Duration {
        self.pipelines
            .values()
            .map(|p| p.timeout())
            .max()
            .unwrap_or(super::pipeline::DEFAULT_TIMEOUT)
    }

    /// Fail runs whose process died: still `running`, heartbeat gone quiet.
    /// Called at startup and on every scheduler tick.
    pub async fn recover_interrupted_runs(&self, deps: &ServerDeps) -> anyhow::Result<u64> {
        let recovered = deps
            .run_store
            .fail_interrupted(heartbeat_cutoff(Utc::now()))
            .await?;
        if recovered > 0 {
            warn!(count = recovered, "marked interrupted pipeline runs as failed");
        }
        Ok(recovered)
    }

    /// Validate, de-duplicate, record and execute one pipeline run.
    ///
    /// Returns `Err` only when no run was started. A pipeline that fails or
    /// times out yields `Ok` with a `failed` run.
    #[tracing::instrument(
        skip(self, request, deps),
        fields(pipeline = %request.pipeline, trigger = %request.trigger)
    )]
    pub async fn invoke(
        &self,
        request: InvokeRequest,
        deps: &Arc<ServerDeps>,
    ) -> Result<InvokeOutcome, PipelineError> {
        let pipeline = self
            .get(&request.pipeline)
            .ok_or_else(|| PipelineError::UnknownPipeline(request.pipeline.clone()))?;
        let descriptor = pipeline.descriptor();

        let allowed = match request.trigger {
            TriggerSource::Webhook => descriptor.webhook,
            TriggerSource::Agent => descriptor.agent_tool,
            _ => true,
        };
        if !allowed {
            return Err(PipelineError::TriggerNotAllowed {
                pipeline: request.pipeline,
                trigger: request.trigger,
            });
        }

        let input = if request.input.is_null() {
            serde_json::json!({})
        } else {
            request.input
        };
        pipeline
            .validate(&input)
            .map_err(|reason| PipelineError::InvalidInput {
                pipeline: request.pipeline.clone(),
                reason,
            })?;

        let store = &deps.run_store;

        if let Some(key) = request.idempotency_key.as_deref() {
            let mut holder = store.find_by_idempotency_key(descriptor.name, key).await?;
            if holder.as_ref().is_some_and(is_orphaned) {
                self.recover_interrupted_runs(deps).await?;
                holder = store.find_by_idempotency_key(descriptor.name, key).await?;
            }
            if let Some(existing) = holder {
                return replay_or_conflict(existing);
            }
        }

        let new_run = NewPipelineRun::builder()
            .pipeline_name(descriptor.name)
            .trigger(request.trigger)
            .user_id(request.user_id)
            .input(input.clone())
            .idempotency_key(request.idempotency_key.clone())
            .scheduled_task_id(request.scheduled_task_id)
            .scheduled_for(request.scheduled_for)
            .build();

        let run = match store.start(new_run).await? {
            StartOutcome::Started(run) => run,
            StartOutcome::KeyConflict => {
                // Lost a race with a concurrent invocation holding the same key
                let key = request.idempotency_key.as_deref().unwrap_or_default();
                return match store.find_by_idempotency_key(descriptor.name, key).await? {
                    Some(existing) => replay_or_conflict(existing),
                    None => Err(PipelineError::Store(anyhow::anyhow!(
                        "idempotency key conflict for {} but no holder found",
                        descriptor.name
                    ))),
                };
            }
        };

        info!(run_id = %run.id, user_id = ?run.user_id, "pipeline run started");
        let started = RunEvent::Started {
            run: PipelineRunData::from(run.clone()),
        };
        publish(deps, &started, run.user_id).await;

        let ctx = PipelineContext {
            run_id: run.id,
            user_id: run.user_id,
            trigger: run.trigger,
            deps: deps.clone(),
        };

        let timeout = pipeline.timeout();
        let execution = tokio::time::timeout(
            timeout,
            AssertUnwindSafe(pipeline.execute_json(input, &ctx)).catch_unwind(),
        );
        tokio::pin!(execution);
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );
        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                _ = heartbeat.tick() => {
                    if let Err(e) = store.heartbeat(run.id).await {
                        warn!(run_id = %run.id, error = %e, "failed to record run heartbeat");
                    }
                }
            }
        };
        let outcome = match result {
            Ok(Ok(Ok(output))) => RunOutcome::Succeeded(output),
            Ok(Ok(Err(e))) => RunOutcome::Failed(format!("{:#}", e)),
            Ok(Err(_panic)) => RunOutcome::Failed("pipeline panicked".to_string()),
            Err(_) => RunOutcome::Failed(format!("timed out after {}s", timeout.as_secs())),
        };

        let run = store.finish(run.id, outcome).await?;
        match run.status {
            RunStatus::Succeeded => {
                info!(run_id = %run.id, duration_ms = ?run.duration_ms, "pipeline run succeeded")
            }
            _ => warn!(
                run_id = %run.id,
                duration_ms = ?run.duration_ms,
                error = run.error.as_deref().unwrap_or_default(),
                "pipeline run failed"
            ),
        }

        let finished = RunEvent::Finished {
            run: PipelineRunData::from(run.clone()),
        };
        publish(deps, &finished, run.user_id).await;

        Ok(InvokeOutcome {
            run,
            replayed: false,
        })
    }
}

fn is_orphaned(run: &PipelineRun) -> bool {
    run.status == RunStatus::Running && run.heartbeat_at < heartbeat_cutoff(Utc::now())
}

fn replay_or_conflict(existing: PipelineRun) -> Result<InvokeOutcome, PipelineError> {
    match existing.status {
        RunStatus::Succeeded => {
            info!(run_id = %existing.id, "replaying succeeded run for idempotency key");
            Ok(InvokeOutcome {
                run: existing,
                replayed: true,
            })
        }
        _ => Err(PipelineError::AlreadyRunning {
            pipeline: existing.pipeline_name,
            run_id: existing.id,
        }),
    }
}

async fn publish(deps: &ServerDeps, event: &RunEvent, user_id: Option<UserId>) {
    let topic = match user_id {
        Some(user_id) => user_topic(user_id),
        None => SYSTEM_TOPIC.to_string(),
    };
    deps.stream_hub.publish_event(&topic, event).await;
}
