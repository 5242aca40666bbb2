use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domains::jobs::JobPosting;
use crate::domains::pipelines::{Pipeline, PipelineContext};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ArchiveStaleJobsInput {
    /// Archive `new` and `saved` postings not updated for this many days.
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStaleJobsOutput {
    pub archived: u64,
}

pub struct ArchiveStaleJobs;

#[async_trait]
impl Pipeline for ArchiveStaleJobs {
    const NAME: &'static str = "archive_stale_jobs";
    const DESCRIPTION: &'static str = "Archive new or saved postings nobody touched in N days";

    type Input = ArchiveStaleJobsInput;
    type Output = ArchiveStaleJobsOutput;

    async fn execute(
        &self,
        input: ArchiveStaleJobsInput,
        ctx: &PipelineContext,
    ) -> Result<ArchiveStaleJobsOutput> {
        let user_id = ctx.require_user()?;
        anyhow::ensure!(input.days >= 1, "days must be at least 1");

        let cutoff = Utc::now() - Duration::days(input.days);
        let archived = JobPosting::archive_stale(user_id, cutoff, &ctx.deps.db_pool).await?;
        Ok(ArchiveStaleJobsOutput { archived })
    }
}
