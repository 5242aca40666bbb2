use anyhow::{bail, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::JobPostingId;
use crate::domains::jobs::activities::load_scoring_profile;
use crate::domains::jobs::{score_job, JobFacts, JobPosting};
use crate::domains::pipelines::{Pipeline, PipelineContext};

const TOP_MATCHES: usize = 5;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScoreJobsInput {
    /// Re-score postings that already have a score.
    #[serde(default)]
    pub rescore: bool,
    /// Maximum postings to score in one run.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    500
}

#[derive(Debug, Clone, Serialize)]
pub struct TopMatch {
    pub job_id: JobPostingId,
    pub title: String,
    pub company: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreJobsOutput {
    pub scored: usize,
    pub top_matches: Vec<TopMatch>,
}

pub struct ScoreJobs;

#[async_trait]
impl Pipeline for ScoreJobs {
    const NAME: &'static str = "score_jobs";
    const DESCRIPTION: &'static str =
        "Score the user's job postings against their profile and primary resume";

    type Input = ScoreJobsInput;
    type Output = ScoreJobsOutput;

    async fn execute(&self, input: ScoreJobsInput, ctx: &PipelineContext) -> Result<ScoreJobsOutput> {
        let user_id = ctx.require_user()?;
        let pool = &ctx.deps.db_pool;

        let Some(profile) = load_scoring_profile(user_id, pool).await? else {
            bail!("no search profile yet; create one before scoring jobs");
        };

        let jobs =
            JobPosting::find_for_scoring(user_id, input.rescore, input.limit.clamp(1, 5000), pool)
                .await?;

        let mut top_matches = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let breakdown = score_job(&profile, &JobFacts::from(job));
            JobPosting::set_score(job.id, &breakdown, pool).await?;
            top_matches.push(TopMatch {
                job_id: job.id,
                title: job.title.clone(),
                company: job.company.clone(),
                score: breakdown.total,
            });
        }

        top_matches.sort_by(|a, b| b.score.cmp(&a.score));
        top_matches.truncate(TOP_MATCHES);

        Ok(ScoreJobsOutput {
            scored: jobs.len(),
            top_matches,
        })
    }
}
