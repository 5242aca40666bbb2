use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Shared secret for HMAC-signed webhook deliveries
    pub webhook_secret: String,
    /// The assistant and AI digests are disabled without a key
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    /// Base URL of the mailbox bridge service that fronts email providers
    pub mailbox_bridge_url: Option<String>,
    pub scheduler_enabled: bool,
    pub scheduler_poll_interval_secs: u64,
    pub scheduler_batch_size: i64,
    pub pipeline_run_retention_days: i64,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "jobtrack".to_string()),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            mailbox_bridge_url: env::var("MAILBOX_BRIDGE_URL").ok().filter(|u| !u.is_empty()),
            scheduler_enabled: env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            scheduler_poll_interval_secs: env::var("SCHEDULER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("SCHEDULER_POLL_INTERVAL_SECS must be a valid number")?,
            scheduler_batch_size: env::var("SCHEDULER_BATCH_SIZE")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("SCHEDULER_BATCH_SIZE must be a valid number")?,
            pipeline_run_retention_days: env::var("PIPELINE_RUN_RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("PIPELINE_RUN_RETENTION_DAYS must be a valid number")?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
