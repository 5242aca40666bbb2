use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domains::jobs::{JobPosting, JobPostingData};
use crate::domains::pipelines::{Pipeline, PipelineContext};
use crate::kernel::user_topic;

const MAX_DIGEST_JOBS: i64 = 20;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DailyDigestInput {
    /// Only postings scoring at least this much are included.
    #[serde(default = "default_min_score")]
    pub min_score: i32,
    /// How far back to look for new postings.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

fn default_min_score() -> i32 {
    70
}

fn default_lookback_hours() -> i64 {
    24
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyDigestOutput {
    pub job_count: usize,
    pub summary: String,
    pub ai_generated: bool,
    pub jobs: Vec<JobPostingData>,
}

pub struct DailyDigest;

/// Plain-text digest, one line per posting.
pub fn plain_summary(jobs: &[JobPosting], min_score: i32, lookback_hours: i64) -> String {
    if jobs.is_empty() {
        return format!(
            "No new postings scored {} or higher in the last {} hours.",
            min_score, lookback_hours
        );
    }

    let mut lines = vec![format!(
        "{} new posting{} scored {} or higher in the last {} hours:",
        jobs.len(),
        if jobs.len() == 1 { "" } else { "s" },
        min_score,
        lookback_hours
    )];
    for job in jobs {
        let location = match (&job.location, job.remote) {
            (_, true) => "remote".to_string(),
            (Some(location), false) => location.clone(),
            (None, false) => "location unknown".to_string(),
        };
        lines.push(format!(
            "- [{}] {} at {} ({})",
            job.score.unwrap_or_default(),
            job.title,
            job.company,
            location
        ));
    }
    lines.join("\n")
}

#[async_trait]
impl Pipeline for DailyDigest {
    const NAME: &'static str = "daily_digest";
    const DESCRIPTION: &'static str =
        "Summarize the best-scoring new postings and push the digest to the user";

    type Input = DailyDigestInput;
    type Output = DailyDigestOutput;

    async fn execute(&self, input: DailyDigestInput, ctx: &PipelineContext) -> Result<DailyDigestOutput> {
        let user_id = ctx.require_user()?;
        anyhow::ensure!(input.lookback_hours >= 1, "lookback_hours must be at least 1");

        let since = Utc::now() - Duration::hours(input.lookback_hours);
        let jobs = JobPosting::find_top_since(
            user_id,
            input.min_score,
            since,
            MAX_DIGEST_JOBS,
            &ctx.deps.db_pool,
        )
        .await?;

        let plain = plain_summary(&jobs, input.min_score, input.lookback_hours);
        let ai = &ctx.deps.ai;

        let (summary, ai_generated) = if ai.is_configured() && !jobs.is_empty() {
            let prompt = format!(
                "Write a short, friendly daily digest for a job seeker. Mention the \
                 strongest matches first and keep it under 150 words.\n\n{}",
                plain
            );
            match ai.complete(&prompt).await {
                Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), true),
                Ok(_) => (plain, false),
                Err(e) => {
                    warn!(error = %e, "digest summary generation failed, using plain text");
                    (plain, false)
                }
            }
        } else {
            (plain, false)
        };

        let jobs: Vec<JobPostingData> = jobs.into_iter().map(Into::into).collect();
        let output = DailyDigestOutput {
            job_count: jobs.len(),
            summary,
            ai_generated,
            jobs,
        };

        ctx.deps
            .stream_hub
            .publish(
                &user_topic(user_id),
                serde_json::json!({
                    "type": "digest",
                    "run_id": ctx.run_id,
                    "summary": output.summary,
                    "job_count": output.job_count,
                }),
            )
            .await;

        Ok(output)
    }
}
