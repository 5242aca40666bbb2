//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domains::auth::JwtService;
use crate::domains::pipelines::{build_pipeline_registry, PostgresRunStore, SharedPipelineRegistry};
use crate::domains::scheduling::{PostgresTaskStore, Scheduler, SchedulerConfig, SchedulerHandle};
use crate::kernel::{
    AiJobExtractor, BaseAI, BaseMailboxService, DisabledAI, HttpJobFeedScraper,
    HttpMailboxService, OpenAiClient, PipelineSettings, ServerDeps, StreamHub,
    UnconfiguredMailboxService,
};
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{
    assistant, email_sources, health_handler, jobs, pipelines, profile, resumes,
    scheduled_tasks, scrape_sources, webhooks, ws,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub db_pool: PgPool,
    pub deps: Arc<ServerDeps>,
    pub registry: SharedPipelineRegistry,
    /// Empty disables the webhook receiver
    pub webhook_secret: Arc<str>,
}

impl AxumAppState {
    pub fn new(deps: Arc<ServerDeps>, registry: SharedPipelineRegistry, webhook_secret: &str) -> Self {
        Self {
            db_pool: deps.db_pool.clone(),
            deps,
            registry,
            webhook_secret: Arc::from(webhook_secret),
        }
    }
}

/// Wire production services from configuration.
pub fn build_deps(config: &Config, pool: PgPool) -> Result<ServerDeps> {
    let ai: Arc<dyn BaseAI> = match &config.openai_api_key {
        Some(key) => Arc::new(
            OpenAiClient::new(key.clone(), config.openai_model.clone())
                .with_base_url(config.openai_base_url.clone()),
        ),
        None => {
            tracing::warn!("OPENAI_API_KEY not set; assistant and AI digests are disabled");
            Arc::new(DisabledAI)
        }
    };

    let mailbox: Arc<dyn BaseMailboxService> = match &config.mailbox_bridge_url {
        Some(url) => Arc::new(HttpMailboxService::new(url.clone())?),
        None => {
            tracing::warn!("MAILBOX_BRIDGE_URL not set; email sync is disabled");
            Arc::new(UnconfiguredMailboxService)
        }
    };

    Ok(ServerDeps::new(
        pool.clone(),
        ai.clone(),
        mailbox,
        Arc::new(AiJobExtractor::new(ai)),
        Arc::new(HttpJobFeedScraper::new()?),
        Arc::new(PostgresRunStore::new(pool.clone())),
        Arc::new(PostgresTaskStore::new(pool)),
        Arc::new(JwtService::new(&config.jwt_secret, config.jwt_issuer.clone())),
        StreamHub::new(),
        PipelineSettings {
            run_retention_days: config.pipeline_run_retention_days,
        },
    ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("idempotency-key"),
        ]);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Build the Axum application router
pub fn build_router(state: AxumAppState, allowed_origins: &[String]) -> Router {
    let jwt_service = state.deps.jwt_service.clone();
    // Slowest pipeline plus slack, so a run is recorded before the client gives up.
    let request_timeout = state.registry.max_timeout() + Duration::from_secs(30);

    let api = Router::new()
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/jobs/:id",
            get(jobs::get_job).put(jobs::update_job).delete(jobs::delete_job),
        )
        .route("/profile", get(profile::get_profile).put(profile::put_profile))
        .route(
            "/resumes",
            get(resumes::list_resumes).post(resumes::create_resume),
        )
        .route(
            "/resumes/:id",
            get(resumes::get_resume)
                .put(resumes::update_resume)
                .delete(resumes::delete_resume),
        )
        .route("/resumes/:id/primary", post(resumes::set_primary_resume))
        .route(
            "/email-sources",
            get(email_sources::list_email_sources).post(email_sources::connect_email_source),
        )
        .route(
            "/email-sources/:id",
            get(email_sources::get_email_source).delete(email_sources::delete_email_source),
        )
        .route(
            "/email-sources/:id/enabled",
            put(email_sources::set_email_source_enabled),
        )
        .route(
            "/scrape-sources",
            get(scrape_sources::list_scrape_sources).post(scrape_sources::create_scrape_source),
        )
        .route(
            "/scrape-sources/:id",
            get(scrape_sources::get_scrape_source).delete(scrape_sources::delete_scrape_source),
        )
        .route("/pipelines", get(pipelines::list_pipelines))
        .route("/pipelines/:name/run", post(pipelines::run_pipeline))
        .route("/pipeline-runs", get(pipelines::list_runs))
        .route("/pipeline-runs/:id", get(pipelines::get_run))
        .route(
            "/scheduled-tasks",
            get(scheduled_tasks::list_tasks).post(scheduled_tasks::create_scheduled_task),
        )
        .route(
            "/scheduled-tasks/:id",
            get(scheduled_tasks::get_task)
                .patch(scheduled_tasks::update_scheduled_task)
                .delete(scheduled_tasks::delete_task),
        )
        .route(
            "/scheduled-tasks/:id/trigger",
            post(scheduled_tasks::trigger_task),
        )
        .route("/assistant/chat", post(assistant::chat))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api", api)
        .route("/webhooks/:user_id/:pipeline", post(webhooks::receive_webhook))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt_service.clone(), req, next)
        }))
        .layer(Extension(state))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// The HTTP router plus the background scheduler, when one was started.
pub struct ServerApp {
    pub router: Router,
    pub scheduler: Option<SchedulerHandle>,
}

/// Build the router and start background work: recover runs a crashed
/// process left `running`, then start the scheduler if enabled.
pub async fn build_app(config: &Config, pool: PgPool) -> Result<ServerApp> {
    let deps = Arc::new(build_deps(config, pool).context("Failed to build server dependencies")?);
    let registry = Arc::new(build_pipeline_registry());

    registry
        .recover_interrupted_runs(&deps)
        .await
        .context("Failed to recover interrupted pipeline runs")?;

    let scheduler = if config.scheduler_enabled {
        let scheduler = Scheduler::with_config(
            registry.clone(),
            deps.clone(),
            SchedulerConfig {
                batch_size: config.scheduler_batch_size,
                poll_interval: Duration::from_secs(config.scheduler_poll_interval_secs.max(1)),
                ..SchedulerConfig::default()
            },
        );
        Some(scheduler.spawn())
    } else {
        tracing::info!("scheduler disabled (SCHEDULER_ENABLED=false)");
        None
    };

    let state = AxumAppState::new(deps, registry, &config.webhook_secret);
    Ok(ServerApp {
        router: build_router(state, &config.allowed_origins),
        scheduler,
    })
}
