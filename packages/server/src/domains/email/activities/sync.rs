use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domains::email::models::{EmailMessage, EmailSource};
use crate::domains::jobs::activities::{ingest_job, load_scoring_profile};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SyncReport {
    pub fetched: usize,
    pub new_messages: usize,
    pub jobs_created: usize,
    pub jobs_updated: usize,
    /// Messages or postings that could not be processed. They are skipped,
    /// not retried; the message is stored either way.
    pub failures: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: &SyncReport) {
        self.fetched += other.fetched;
        self.new_messages += other.new_messages;
        self.jobs_created += other.jobs_created;
        self.jobs_updated += other.jobs_updated;
        self.failures += other.failures;
    }
}

/// Pull one batch of new mail for a source, store unseen messages, turn the
/// postings they mention into scored jobs and advance the cursor.
pub async fn sync_email_source(
    source: &EmailSource,
    limit: usize,
    deps: &ServerDeps,
) -> Result<SyncReport> {
    let pool = &deps.db_pool;
    let batch = deps
        .mailbox
        .fetch_messages(&source.credentials(), source.sync_cursor.as_deref(), limit)
        .await
        .with_context(|| format!("Failed to fetch mail for {}", source.address))?;

    let scoring = load_scoring_profile(source.user_id, pool).await?;
    let mut report = SyncReport {
        fetched: batch.messages.len(),
        ..Default::default()
    };

    for email in &batch.messages {
        let Some(message) =
            EmailMessage::insert_if_new(source.id, source.user_id, email, pool).await?
        else {
            continue;
        };
        report.new_messages += 1;

        let jobs = match deps.job_extractor.extract_jobs(email).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "job extraction failed"
                );
                report.failures += 1;
                continue;
            }
        };

        let mut linked = false;
        for job in &jobs {
            match ingest_job(source.user_id, job, "email", scoring.as_ref(), pool).await {
                Ok(outcome) => {
                    if outcome.created {
                        report.jobs_created += 1;
                    } else {
                        report.jobs_updated += 1;
                    }
                    if !linked {
                        EmailMessage::link_job(message.id, outcome.job.id, pool).await?;
                        linked = true;
                    }
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "skipping extracted job");
                    report.failures += 1;
                }
            }
        }
    }

    EmailSource::record_sync(source.id, batch.next_cursor.as_deref(), pool).await?;

    info!(
        email_source_id = %source.id,
        fetched = report.fetched,
        new_messages = report.new_messages,
        jobs_created = report.jobs_created,
        "email source synced"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counts() {
        let mut total = SyncReport {
            fetched: 2,
            new_messages: 1,
            ..Default::default()
        };
        total.merge(&SyncReport {
            fetched: 3,
            new_messages: 3,
            jobs_created: 2,
            jobs_updated: 1,
            failures: 1,
        });
        assert_eq!(
            total,
            SyncReport {
                fetched: 5,
                new_messages: 4,
                jobs_created: 2,
                jobs_updated: 1,
                failures: 1,
            }
        );
    }
}
