use anyhow::{bail, Result};
use sqlx::PgPool;
use tracing::debug;

use super::scoring::{score_job, JobFacts, ScoringProfile};
use crate::common::UserId;
use crate::domains::jobs::models::JobPosting;
use crate::domains::profiles::Profile;
use crate::domains::resumes::Resume;
use crate::kernel::ExtractedJob;

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub job: JobPosting,
    pub created: bool,
}

/// Profile merged with the primary resume, or `None` when the user has no
/// profile yet.
pub async fn load_scoring_profile(user_id: UserId, pool: &PgPool) -> Result<Option<ScoringProfile>> {
    let Some(profile) = Profile::find_by_user(user_id, pool).await? else {
        return Ok(None);
    };
    let resume = Resume::find_primary(user_id, pool).await?;
    Ok(Some(ScoringProfile::build(&profile, resume.as_ref())))
}

/// Store a posting (deduplicated by fingerprint) and score it when a
/// scoring profile is available.
pub async fn ingest_job(
    user_id: UserId,
    job: &ExtractedJob,
    source: &str,
    scoring: Option<&ScoringProfile>,
    pool: &PgPool,
) -> Result<IngestOutcome> {
    if job.title.trim().is_empty() || job.company.trim().is_empty() {
        bail!("job posting needs a title and a company");
    }

    let upserted = JobPosting::upsert(user_id, job, source, pool).await?;
    let mut posting = upserted.job;

    if let Some(profile) = scoring {
        let breakdown = score_job(profile, &JobFacts::from(&posting));
        posting = JobPosting::set_score(posting.id, &breakdown, pool).await?;
    }

    debug!(
        job_id = %posting.id,
        created = upserted.inserted,
        score = ?posting.score,
        source = %source,
        "ingested job posting"
    );

    Ok(IngestOutcome {
        job: posting,
        created: upserted.inserted,
    })
}
