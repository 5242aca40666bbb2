use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domains::jobs::activities::{ingest_job, load_scoring_profile};
use crate::domains::sources::models::ScrapeSource;
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeReport {
    pub found: usize,
    pub jobs_created: usize,
    pub jobs_updated: usize,
    pub failures: usize,
}

/// Fetch the postings a source currently lists and ingest them.
pub async fn scrape_source(source: &ScrapeSource, deps: &ServerDeps) -> Result<ScrapeReport> {
    let pool = &deps.db_pool;
    let jobs = deps
        .job_scraper
        .scrape(&source.url)
        .await
        .with_context(|| format!("Failed to scrape {}", source.name))?;

    let scoring = load_scoring_profile(source.user_id, pool).await?;
    let origin = format!("scrape:{}", source.name);
    let mut report = ScrapeReport {
        found: jobs.len(),
        ..Default::default()
    };

    for job in &jobs {
        match ingest_job(source.user_id, job, &origin, scoring.as_ref(), pool).await {
            Ok(outcome) if outcome.created => report.jobs_created += 1,
            Ok(_) => report.jobs_updated += 1,
            Err(e) => {
                warn!(scrape_source_id = %source.id, error = %e, "skipping scraped job");
                report.failures += 1;
            }
        }
    }

    ScrapeSource::mark_scraped(source.id, pool).await?;

    info!(
        scrape_source_id = %source.id,
        found = report.found,
        jobs_created = report.jobs_created,
        "scrape source processed"
    );

    Ok(report)
}
