use serde::Serialize;

use crate::domains::jobs::activities::scoring::ScoreBreakdown;
use crate::domains::jobs::models::{JobPosting, JobStatus};

#[derive(Debug, Clone, Serialize)]
pub struct JobPostingData {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub remote: bool,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: Option<String>,
    pub description: String,
    pub source: String,
    pub status: JobStatus,
    pub score: Option<i32>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub scored_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobPosting> for JobPostingData {
    fn from(job: JobPosting) -> Self {
        Self {
            id: job.id.to_string(),
            title: job.title,
            company: job.company,
            location: job.location,
            remote: job.remote,
            salary_min: job.salary_min,
            salary_max: job.salary_max,
            url: job.url,
            description: job.description,
            source: job.source,
            status: job.status,
            score: job.score,
            score_breakdown: job.score_breakdown.map(|b| b.0),
            scored_at: job.scored_at.map(|t| t.to_rfc3339()),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}
