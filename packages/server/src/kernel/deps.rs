//! Server dependencies shared by pipelines, activities and routes.
//!
//! External services and the two run-tracking stores sit behind traits so the
//! same pipelines run against mocks and in-memory stores in tests.

use sqlx::PgPool;
use std::sync::Arc;

use crate::domains::auth::JwtService;
use crate::domains::pipelines::PipelineRunStore;
use crate::domains::scheduling::ScheduledTaskStore;
use crate::kernel::{
    stream_hub::StreamHub, BaseAI, BaseJobExtractor, BaseJobScraper, BaseMailboxService,
};

/// Tunables pipelines read at run time.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub run_retention_days: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            run_retention_days: 30,
        }
    }
}

/// Server dependencies accessible to pipelines (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    /// LLM for the assistant, digests and email extraction
    pub ai: Arc<dyn BaseAI>,
    pub mailbox: Arc<dyn BaseMailboxService>,
    pub job_extractor: Arc<dyn BaseJobExtractor>,
    pub job_scraper: Arc<dyn BaseJobScraper>,
    pub run_store: Arc<dyn PipelineRunStore>,
    pub task_store: Arc<dyn ScheduledTaskStore>,
    pub jwt_service: Arc<JwtService>,
    /// In-process pub/sub hub for websocket streaming
    pub stream_hub: StreamHub,
    pub settings: PipelineSettings,
}

impl ServerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        ai: Arc<dyn BaseAI>,
        mailbox: Arc<dyn BaseMailboxService>,
        job_extractor: Arc<dyn BaseJobExtractor>,
        job_scraper: Arc<dyn BaseJobScraper>,
        run_store: Arc<dyn PipelineRunStore>,
        task_store: Arc<dyn ScheduledTaskStore>,
        jwt_service: Arc<JwtService>,
        stream_hub: StreamHub,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            db_pool,
            ai,
            mailbox,
            job_extractor,
            job_scraper,
            run_store,
            task_store,
            jwt_service,
            stream_hub,
            settings,
        }
    }
}
