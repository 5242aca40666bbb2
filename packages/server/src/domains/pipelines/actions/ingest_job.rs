use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domains::jobs::activities::{ingest_job, load_scoring_profile};
use crate::domains::jobs::JobPostingData;
use crate::domains::pipelines::{Pipeline, PipelineContext};
use crate::kernel::ExtractedJob;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IngestJobInput {
    #[serde(flatten)]
    pub job: ExtractedJob,
    /// Free-form origin label stored on the posting.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestJobOutput {
    pub created: bool,
    pub job: JobPostingData,
}

pub struct IngestJob;

#[async_trait]
impl Pipeline for IngestJob {
    const NAME: &'static str = "ingest_job";
    const DESCRIPTION: &'static str =
        "Create or update a job posting, deduplicated by company, title and location";
    const WEBHOOK: bool = true;

    type Input = IngestJobInput;
    type Output = IngestJobOutput;

    async fn execute(&self, input: IngestJobInput, ctx: &PipelineContext) -> Result<IngestJobOutput> {
        let user_id = ctx.require_user()?;
        let pool = &ctx.deps.db_pool;

        let scoring = load_scoring_profile(user_id, pool).await?;
        let outcome = ingest_job(user_id, &input.job, &input.source, scoring.as_ref(), pool).await?;

        Ok(IngestJobOutput {
            created: outcome.created,
            job: outcome.job.into(),
        })
    }
}
