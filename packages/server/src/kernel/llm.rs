//! OpenAI-compatible chat-completions client backing `BaseAI`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::BaseAI;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration error (missing API key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, rate limit, invalid request)
    #[error("API error: {0}")]
    Api(String),

    /// Parse error (unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Clone)]
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST a chat-completions body and return `choices[0].message`.
    async fn chat(&self, mut body: Value) -> Result<Value, LlmError> {
        let start = std::time::Instant::now();
        body["model"] = Value::String(self.model.clone());

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM request failed");
                LlmError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "LLM API error");
            return Err(LlmError::Api(format!("{}: {}", status, error_text)));
        }

        let mut raw: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let message = raw
            .pointer_mut("/choices/0/message")
            .map(Value::take)
            .ok_or_else(|| LlmError::Api("No choices in response".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );

        Ok(message)
    }
}

fn message_text(message: &Value) -> Result<String, LlmError> {
    message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::Parse("assistant message has no text content".into()))
}

#[async_trait]
impl BaseAI for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let message = self
            .chat(json!({ "messages": [{ "role": "user", "content": prompt }] }))
            .await?;
        Ok(message_text(&message)?)
    }

    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: Value,
    ) -> Result<String> {
        let message = self
            .chat(json!({
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
                "response_format": {
                    "type": "json_schema",
                    "json_schema": { "name": "response", "schema": schema },
                },
            }))
            .await?;
        Ok(message_text(&message)?)
    }

    async fn generate_with_tools(&self, messages: &[Value], tools: &Value) -> Result<Value> {
        let mut body = json!({ "messages": messages });
        if tools.as_array().is_some_and(|t| !t.is_empty()) {
            body["tools"] = tools.clone();
        }
        Ok(self.chat(body).await?)
    }
}

/// Stand-in used when no API key is configured. Every call fails with a
/// configuration error so callers can fall back.
pub struct DisabledAI;

#[async_trait]
impl BaseAI for DisabledAI {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(LlmError::Config("OPENAI_API_KEY is not set".into()).into())
    }

    async fn generate_with_tools(&self, _messages: &[Value], _tools: &Value) -> Result<Value> {
        Err(LlmError::Config("OPENAI_API_KEY is not set".into()).into())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text() {
        let msg = json!({"role": "assistant", "content": "hi"});
        assert_eq!(message_text(&msg).unwrap(), "hi");

        let tool_only = json!({"role": "assistant", "content": null, "tool_calls": []});
        assert!(message_text(&tool_only).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAiClient::new("k", "m").with_base_url("http://localhost:8000/v1/");
        assert_eq!(client.base_url, "http://localhost:8000/v1");
    }

    #[tokio::test]
    async fn test_disabled_ai_reports_unconfigured() {
        let ai = DisabledAI;
        assert!(!ai.is_configured());
        let err = ai.complete("hello").await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
