use serde::Serialize;

use crate::domains::pipelines::models::{PipelineRun, RunStatus, TriggerSource};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunData {
    pub id: String,
    pub pipeline: String,
    pub trigger: TriggerSource,
    pub status: RunStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub idempotency_key: Option<String>,
    pub scheduled_task_id: Option<String>,
    pub scheduled_for: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<i64>,
}

impl From<PipelineRun> for PipelineRunData {
    fn from(run: PipelineRun) -> Self {
        Self {
            id: run.id.to_string(),
            pipeline: run.pipeline_name,
            trigger: run.trigger,
            status: run.status,
            input: run.input,
            output: run.output,
            error: run.error,
            idempotency_key: run.idempotency_key,
            scheduled_task_id: run.scheduled_task_id.map(|id| id.to_string()),
            scheduled_for: run.scheduled_for.map(|t| t.to_rfc3339()),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            duration_ms: run.duration_ms,
        }
    }
}

/// Stream hub payload for run lifecycle changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "pipeline_run.started")]
    Started { run: PipelineRunData },
    #[serde(rename = "pipeline_run.finished")]
    Finished { run: PipelineRunData },
}
