use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domains::pipelines::{Pipeline, PipelineContext};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PrunePipelineRunsInput {
    /// Keep finished runs newer than this many days. Defaults to the
    /// configured retention.
    #[serde(default)]
    pub retention_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrunePipelineRunsOutput {
    pub deleted: u64,
    pub cutoff: DateTime<Utc>,
}

pub struct PrunePipelineRuns;

#[async_trait]
impl Pipeline for PrunePipelineRuns {
    const NAME: &'static str = "prune_pipeline_runs";
    const DESCRIPTION: &'static str = "Delete finished pipeline runs older than the retention window";
    const AGENT_TOOL: bool = false;

    type Input = PrunePipelineRunsInput;
    type Output = PrunePipelineRunsOutput;

    async fn execute(
        &self,
        input: PrunePipelineRunsInput,
        ctx: &PipelineContext,
    ) -> Result<PrunePipelineRunsOutput> {
        let days = input
            .retention_days
            .unwrap_or(ctx.deps.settings.run_retention_days);
        anyhow::ensure!(days >= 1, "retention_days must be at least 1");

        let cutoff = Utc::now() - Duration::days(days);
        let deleted = ctx.deps.run_store.prune_finished_before(cutoff).await?;
        Ok(PrunePipelineRunsOutput { deleted, cutoff })
    }
}
