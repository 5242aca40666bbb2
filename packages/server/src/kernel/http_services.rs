//! HTTP-backed mailbox bridge and job-feed scraper, plus the AI job
//! extractor.
//!
//! Provider-specific OAuth and HTML parsing live behind the mailbox bridge and
//! the job feeds; this side only speaks their JSON contracts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use super::{
    BaseAI, BaseJobExtractor, BaseJobScraper, BaseMailboxService, ExtractedJob, IncomingEmail,
    MailboxBatch, MailboxCredentials,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("jobtrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

// =============================================================================
// Mailbox bridge
// =============================================================================

/// `GET {base}/messages?provider=&address=&cursor=&limit=` with the mailbox's
/// bearer token, answering with a [`MailboxBatch`].
pub struct HttpMailboxService {
    client: Client,
    base_url: String,
}

impl HttpMailboxService {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BaseMailboxService for HttpMailboxService {
    async fn fetch_messages(
        &self,
        mailbox: &MailboxCredentials,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<MailboxBatch> {
        let limit = limit.to_string();
        let mut query = vec![
            ("provider", mailbox.provider.as_str()),
            ("address", mailbox.address.as_str()),
            ("limit", limit.as_str()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let mut request = self
            .client
            .get(format!("{}/messages", self.base_url))
            .query(&query);
        if let Some(token) = &mailbox.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Mailbox bridge request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Mailbox bridge returned {}: {}", status, body);
        }

        let batch: MailboxBatch = response
            .json()
            .await
            .context("Mailbox bridge returned an invalid batch")?;
        debug!(
            address = %mailbox.address,
            messages = batch.messages.len(),
            "fetched mailbox batch"
        );
        Ok(batch)
    }
}

/// Used when `MAILBOX_BRIDGE_URL` is unset.
pub struct UnconfiguredMailboxService;

#[async_trait]
impl BaseMailboxService for UnconfiguredMailboxService {
    async fn fetch_messages(
        &self,
        _mailbox: &MailboxCredentials,
        _cursor: Option<&str>,
        _limit: usize,
    ) -> Result<MailboxBatch> {
        bail!("No mailbox bridge configured (MAILBOX_BRIDGE_URL is not set)")
    }
}

// =============================================================================
// JSON job feeds
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum JobFeed {
    List(Vec<ExtractedJob>),
    Wrapped { jobs: Vec<ExtractedJob> },
}

impl From<JobFeed> for Vec<ExtractedJob> {
    fn from(feed: JobFeed) -> Self {
        match feed {
            JobFeed::List(jobs) | JobFeed::Wrapped { jobs } => jobs,
        }
    }
}

/// Reads a JSON job feed: either an array of postings or `{"jobs": [...]}`.
pub struct HttpJobFeedScraper {
    client: Client,
}

impl HttpJobFeedScraper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[async_trait]
impl BaseJobScraper for HttpJobFeedScraper {
    async fn scrape(&self, url: &str) -> Result<Vec<ExtractedJob>> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to fetch job feed {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Job feed {} returned {}", url, status);
        }

        let feed: JobFeed = response
            .json()
            .await
            .with_context(|| format!("Job feed {} is not valid JSON", url))?;
        Ok(feed.into())
    }
}

// =============================================================================
// AI job extraction
// =============================================================================

#[derive(Deserialize, JsonSchema)]
struct ExtractionResponse {
    jobs: Vec<ExtractedJob>,
}

const EXTRACTION_PROMPT: &str = "You read job-alert and recruiter emails. List every concrete \
job posting the email mentions. Use null for unknown fields, annual salaries in whole \
currency units, and an empty list when the email contains no postings.";

/// Asks the LLM to pull postings out of an email.
pub struct AiJobExtractor {
    ai: Arc<dyn BaseAI>,
}

impl AiJobExtractor {
    pub fn new(ai: Arc<dyn BaseAI>) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl BaseJobExtractor for AiJobExtractor {
    async fn extract_jobs(&self, email: &IncomingEmail) -> Result<Vec<ExtractedJob>> {
        if !self.ai.is_configured() {
            return Ok(Vec::new());
        }

        let schema = serde_json::to_value(schemars::schema_for!(ExtractionResponse))?;
        let prompt = format!(
            "From: {}\nSubject: {}\n\n{}",
            email.sender, email.subject, email.body
        );
        let raw = self
            .ai
            .generate_structured(EXTRACTION_PROMPT, &prompt, schema)
            .await?;
        let parsed: ExtractionResponse =
            serde_json::from_str(&raw).context("Extractor returned malformed JSON")?;
        Ok(parsed.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_feed_accepts_both_shapes() {
        let list: JobFeed = serde_json::from_str(
            r#"[{"title": "Rust Engineer", "company": "Acme"}]"#,
        )
        .unwrap();
        let wrapped: JobFeed = serde_json::from_str(
            r#"{"jobs": [{"title": "Rust Engineer", "company": "Acme", "remote": true}]}"#,
        )
        .unwrap();

        let list: Vec<ExtractedJob> = list.into();
        let wrapped: Vec<ExtractedJob> = wrapped.into();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].description, "");
        assert!(wrapped[0].remote);
    }

    #[tokio::test]
    async fn test_extractor_is_noop_without_model() {
        let extractor = AiJobExtractor::new(Arc::new(super::super::llm::DisabledAI));
        let email = IncomingEmail {
            provider_message_id: "m1".into(),
            subject: "New jobs".into(),
            sender: "alerts@example.com".into(),
            received_at: chrono::Utc::now(),
            body: "Rust Engineer at Acme".into(),
        };
        assert!(extractor.extract_jobs(&email).await.unwrap().is_empty());
    }
}
