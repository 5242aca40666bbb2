use anyhow::{anyhow, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::EmailSourceId;
use crate::domains::email::{sync_email_source, EmailSource, SyncReport};
use crate::domains::pipelines::{Pipeline, PipelineContext};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SyncEmailSourceInput {
    /// Source to sync. All enabled sources when omitted.
    #[serde(default)]
    pub email_source_id: Option<EmailSourceId>,
    /// Messages to fetch per source.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncEmailSourceOutput {
    pub sources: usize,
    /// Sources whose mailbox could not be read.
    pub failed_sources: Vec<EmailSourceId>,
    #[serde(flatten)]
    pub report: SyncReport,
}

pub struct SyncEmailSource;

#[async_trait]
impl Pipeline for SyncEmailSource {
    const NAME: &'static str = "sync_email_source";
    const DESCRIPTION: &'static str =
        "Fetch new mail from connected mailboxes and ingest the job postings it mentions";
    const WEBHOOK: bool = true;

    type Input = SyncEmailSourceInput;
    type Output = SyncEmailSourceOutput;

    async fn execute(
        &self,
        input: SyncEmailSourceInput,
        ctx: &PipelineContext,
    ) -> Result<SyncEmailSourceOutput> {
        let user_id = ctx.require_user()?;
        let pool = &ctx.deps.db_pool;
        let limit = input.limit.clamp(1, 500);

        // A single named source is allowed to fail the run; a sweep keeps going.
        if let Some(id) = input.email_source_id {
            let source = EmailSource::find_for_user(id, user_id, pool)
                .await?
                .ok_or_else(|| anyhow!("email source {} not found", id))?;
            let report = sync_email_source(&source, limit, &ctx.deps).await?;
            return Ok(SyncEmailSourceOutput {
                sources: 1,
                failed_sources: Vec::new(),
                report,
            });
        }

        let sources = EmailSource::list_enabled_for_user(user_id, pool).await?;
        let mut output = SyncEmailSourceOutput {
            sources: sources.len(),
            failed_sources: Vec::new(),
            report: SyncReport::default(),
        };
        for source in &sources {
            match sync_email_source(source, limit, &ctx.deps).await {
                Ok(report) => output.report.merge(&report),
                Err(e) => {
                    warn!(email_source_id = %source.id, error = %format!("{:#}", e), "email sync failed");
                    output.failed_sources.push(source.id);
                }
            }
        }
        Ok(output)
    }
}
