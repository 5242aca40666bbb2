use anyhow::{anyhow, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::ScrapeSourceId;
use crate::domains::pipelines::{Pipeline, PipelineContext};
use crate::domains::sources::{scrape_source, ScrapeReport, ScrapeSource};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScrapeSourceInput {
    /// Source to scrape. All enabled sources when omitted.
    #[serde(default)]
    pub scrape_source_id: Option<ScrapeSourceId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeSourceOutput {
    pub sources: usize,
    pub failed_sources: Vec<ScrapeSourceId>,
    pub found: usize,
    pub jobs_created: usize,
    pub jobs_updated: usize,
    pub failures: usize,
}

impl ScrapeSourceOutput {
    fn add(&mut self, report: &ScrapeReport) {
        self.found += report.found;
        self.jobs_created += report.jobs_created;
        self.jobs_updated += report.jobs_updated;
        self.failures += report.failures;
    }
}

pub struct ScrapeSourcePipeline;

#[async_trait]
impl Pipeline for ScrapeSourcePipeline {
    const NAME: &'static str = "scrape_source";
    const DESCRIPTION: &'static str = "Fetch the postings a job board or career page lists";

    type Input = ScrapeSourceInput;
    type Output = ScrapeSourceOutput;

    async fn execute(
        &self,
        input: ScrapeSourceInput,
        ctx: &PipelineContext,
    ) -> Result<ScrapeSourceOutput> {
        let user_id = ctx.require_user()?;
        let pool = &ctx.deps.db_pool;
        let mut output = ScrapeSourceOutput::default();

        if let Some(id) = input.scrape_source_id {
            let source = ScrapeSource::find_for_user(id, user_id, pool)
                .await?
                .ok_or_else(|| anyhow!("scrape source {} not found", id))?;
            let report = scrape_source(&source, &ctx.deps).await?;
            output.sources = 1;
            output.add(&report);
            return Ok(output);
        }

        let sources = ScrapeSource::list_enabled_for_user(user_id, pool).await?;
        output.sources = sources.len();
        for source in &sources {
            match scrape_source(source, &ctx.deps).await {
                Ok(report) => output.add(&report),
                Err(e) => {
                    warn!(scrape_source_id = %source.id, error = %format!("{:#}", e), "scrape failed");
                    output.failed_sources.push(source.id);
                }
            }
        }
        Ok(output)
    }
}
