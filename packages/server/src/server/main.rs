// jobtrack API server: REST, webhooks, websocket streams and the cron scheduler

use std::time::Duration;

use anyhow::{Context, Result};
use jobtrack_core::domains::scheduling::Scheduler;
use jobtrack_core::server::{build_app, ServerApp};
use jobtrack_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobtrack_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        scheduler = config.scheduler_enabled,
        assistant = config.openai_api_key.is_some(),
        webhooks = !config.webhook_secret.is_empty(),
        "starting jobtrack API"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("database ready");

    let ServerApp { router, scheduler } = build_app(&config, pool).await?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "listening");

    let stop_scheduler = scheduler.as_ref().map(|handle| handle.scheduler().clone());
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(stop_scheduler))
        .await
        .context("Server error");

    // Scheduled runs already claimed must be recorded before the process exits
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    served
}

async fn shutdown_signal(scheduler: Option<Scheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    if let Some(scheduler) = scheduler {
        scheduler.request_shutdown();
    }
}
