// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Pipelines and activities call external services through them so tests can
// swap in the doubles from `test_dependencies`.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BaseMailboxService)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// AI Trait (Infrastructure - Generic LLM capabilities)
// =============================================================================

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Complete a prompt with an LLM (returns raw text response)
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete with a system prompt and a JSON schema for the answer.
    /// Returns the raw JSON string; callers parse it.
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let _ = schema;
        let combined = format!(
            "{}\n\nRespond with valid JSON.\n\n{}",
            system_prompt, user_prompt
        );
        self.complete(&combined).await
    }

    /// Chat completion with tool definitions.
    ///
    /// `messages` are chat-completions messages; returns the assistant message,
    /// which may carry `tool_calls`.
    async fn generate_with_tools(
        &self,
        messages: &[serde_json::Value],
        tools: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        // Default implementation - not all providers support tools
        let _ = tools;
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("");
        let response = self.complete(last_user).await?;
        Ok(serde_json::json!({"role": "assistant", "content": response}))
    }

    /// Whether a real model backs this client.
    fn is_configured(&self) -> bool {
        true
    }
}

// =============================================================================
// Mailbox Trait (Infrastructure - email provider bridge)
// =============================================================================

/// Credentials the mailbox bridge needs to read one mailbox.
#[derive(Debug, Clone)]
pub struct MailboxCredentials {
    pub provider: String,
    pub address: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEmail {
    pub provider_message_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailboxBatch {
    pub messages: Vec<IncomingEmail>,
    /// Cursor to resume from on the next sync; `None` keeps the current one.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait BaseMailboxService: Send + Sync {
    /// Fetch messages received after `cursor` (oldest first).
    async fn fetch_messages(
        &self,
        mailbox: &MailboxCredentials,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<MailboxBatch>;
}

// =============================================================================
// Job extraction / scraping Traits (Infrastructure)
// =============================================================================

/// A job posting found in an email or a scraped feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedJob {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub salary_min: Option<i32>,
    #[serde(default)]
    pub salary_max: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[async_trait]
pub trait BaseJobExtractor: Send + Sync {
    /// Job postings mentioned in an email (job alerts, recruiter mail).
    async fn extract_jobs(&self, email: &IncomingEmail) -> Result<Vec<ExtractedJob>>;
}

#[async_trait]
pub trait BaseJobScraper: Send + Sync {
    /// Job postings currently listed at `url`.
    async fn scrape(&self, url: &str) -> Result<Vec<ExtractedJob>>;
}
