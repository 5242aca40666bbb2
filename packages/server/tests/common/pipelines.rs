//! Small pipelines with predictable behavior for registry, scheduler and
//! assistant tests. None of them touch the database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use jobtrack_core::common::{PipelineRunId, ScheduledTaskId, UserId};
use jobtrack_core::domains::pipelines::{
    Pipeline, PipelineContext, PipelineRegistry, PipelineRun, RunStatus, TriggerSource,
};
use jobtrack_core::domains::scheduling::{MisfirePolicy, OverlapPolicy, ScheduledTask};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EchoInput {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EchoOutput {
    pub echoed: String,
}

/// Echoes its input and counts executions.
pub struct Echo {
    pub executions: Arc<AtomicUsize>,
}

#[async_trait]
impl Pipeline for Echo {
    const NAME: &'static str = "echo";
    const DESCRIPTION: &'static str = "Echo a message back";
    const WEBHOOK: bool = true;

    type Input = EchoInput;
    type Output = EchoOutput;

    async fn execute(&self, input: EchoInput, _ctx: &PipelineContext) -> Result<EchoOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(EchoOutput {
            echoed: input.message,
        })
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoInput {}

pub struct AlwaysFails;

#[async_trait]
impl Pipeline for AlwaysFails {
    const NAME: &'static str = "always_fails";
    const DESCRIPTION: &'static str = "Fails every time";

    type Input = NoInput;
    type Output = serde_json::Value;

    async fn execute(&self, _input: NoInput, _ctx: &PipelineContext) -> Result<serde_json::Value> {
        bail!("upstream said no")
    }
}

pub struct TooSlow;

#[async_trait]
impl Pipeline for TooSlow {
    const NAME: &'static str = "too_slow";
    const DESCRIPTION: &'static str = "Sleeps past its timeout";

    type Input = NoInput;
    type Output = serde_json::Value;

    fn timeout(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn execute(&self, _input: NoInput, _ctx: &PipelineContext) -> Result<serde_json::Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!({}))
    }
}

pub struct Panics;

#[async_trait]
impl Pipeline for Panics {
    const NAME: &'static str = "panics";
    const DESCRIPTION: &'static str = "Panics";

    type Input = NoInput;
    type Output = serde_json::Value;

    async fn execute(&self, _input: NoInput, _ctx: &PipelineContext) -> Result<serde_json::Value> {
        panic!("boom")
    }
}

/// Reports who it ran for; hidden from the assistant.
pub struct WhoAmI;

#[async_trait]
impl Pipeline for WhoAmI {
    const NAME: &'static str = "whoami";
    const DESCRIPTION: &'static str = "Report the invoking user and trigger";
    const AGENT_TOOL: bool = false;

    type Input = NoInput;
    type Output = serde_json::Value;

    async fn execute(&self, _input: NoInput, ctx: &PipelineContext) -> Result<serde_json::Value> {
        let user_id = ctx.require_user()?;
        Ok(json!({"user_id": user_id.to_string(), "trigger": ctx.trigger}))
    }
}

/// Takes a while, then counts its completions.
pub struct Sleepy {
    pub finished: Arc<AtomicUsize>,
}

#[async_trait]
impl Pipeline for Sleepy {
    const NAME: &'static str = "sleepy";
    const DESCRIPTION: &'static str = "Sleep for 300ms";

    type Input = NoInput;
    type Output = serde_json::Value;

    async fn execute(&self, _input: NoInput, _ctx: &PipelineContext) -> Result<serde_json::Value> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(json!({}))
    }
}

pub struct TestPipelines {
    pub registry: Arc<PipelineRegistry>,
    pub echo_executions: Arc<AtomicUsize>,
}

impl TestPipelines {
    pub fn echo_count(&self) -> usize {
        self.echo_executions.load(Ordering::SeqCst)
    }
}

pub fn test_registry() -> TestPipelines {
    let echo_executions = Arc::new(AtomicUsize::new(0));
    let mut registry = PipelineRegistry::new();
    registry
        .register(Echo {
            executions: echo_executions.clone(),
        })
        .register(AlwaysFails)
        .register(TooSlow)
        .register(Panics)
        .register(WhoAmI);

    TestPipelines {
        registry: Arc::new(registry),
        echo_executions,
    }
}

/// A task row as the store would hold it.
pub fn scheduled_task(
    user_id: UserId,
    pipeline: &str,
    cron_expression: &str,
    next_run_at: DateTime<Utc>,
) -> ScheduledTask {
    ScheduledTask {
        id: ScheduledTaskId::new(),
        user_id,
        name: format!("{} on {}", pipeline, cron_expression),
        cron_expression: cron_expression.to_string(),
        pipeline_name: pipeline.to_string(),
        input: json!({"message": "scheduled"}),
        enabled: true,
        misfire_policy: MisfirePolicy::SkipToLatest,
        overlap_policy: OverlapPolicy::Skip,
        next_run_at,
        last_fired_at: None,
        last_run_id: None,
        last_run_status: None,
        created_at: next_run_at,
        updated_at: next_run_at,
    }
}

/// A run left in `running`, e.g. by a crashed process.
pub fn running_run(pipeline: &str, started_at: DateTime<Utc>, idempotency_key: Option<&str>) -> PipelineRun {
    PipelineRun {
        id: PipelineRunId::new(),
        user_id: None,
        pipeline_name: pipeline.to_string(),
        trigger: TriggerSource::Api,
        status: RunStatus::Running,
        input: json!({}),
        output: None,
        error: None,
        idempotency_key: idempotency_key.map(str::to_string),
        scheduled_task_id: None,
        scheduled_for: None,
        started_at,
        finished_at: None,
        duration_ms: None,
        heartbeat_at: started_at,
        created_at: started_at,
        updated_at: started_at,
    }
}
