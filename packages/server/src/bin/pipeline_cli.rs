//! Operator CLI for the pipeline registry and the scheduler.
//!
//! Prints JSON on stdout; logs go to stderr.
//!
//!   pipeline_cli list
//!   pipeline_cli run score_jobs --user <uuid> --input '{"rescore": true}'
//!   pipeline_cli schedules
//!   pipeline_cli tick

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use jobtrack_core::common::UserId;
use jobtrack_core::config::Config;
use jobtrack_core::domains::pipelines::{
    build_pipeline_registry, InvokeRequest, PipelineRunData, TriggerSource,
};
use jobtrack_core::domains::scheduling::{ScheduledTask, ScheduledTaskData, Scheduler};
use jobtrack_core::domains::users::User;
use jobtrack_core::server::build_deps;

#[derive(Parser)]
#[command(name = "pipeline_cli")]
#[command(about = "Run pipelines and inspect schedules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pipelines with their input schemas
    List,

    /// Run a pipeline once
    Run {
        name: String,
        /// Owning user (required by user-scoped pipelines)
        #[arg(long)]
        user: Option<String>,
        /// Pipeline input as JSON
        #[arg(long, default_value = "{}")]
        input: String,
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// List every scheduled task with its next occurrences
    Schedules,

    /// Run a single scheduler pass
    Tick,
}

#[derive(Serialize)]
struct RunOutput {
    run: PipelineRunData,
    replayed: bool,
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobtrack_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => output(&build_pipeline_registry().describe()),
        Commands::Run {
            name,
            user,
            input,
            idempotency_key,
        } => cmd_run(&name, user.as_deref(), &input, idempotency_key).await,
        Commands::Schedules => cmd_schedules().await,
        Commands::Tick => cmd_tick().await,
    }
}

async fn get_pool(config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

async fn cmd_run(
    name: &str,
    user: Option<&str>,
    input: &str,
    idempotency_key: Option<String>,
) -> Result<()> {
    let input: serde_json::Value =
        serde_json::from_str(input).context("--input must be valid JSON")?;

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = get_pool(&config).await?;

    let user_id = user
        .map(UserId::parse)
        .transpose()
        .context("--user must be a UUID")?;
    if let Some(user_id) = user_id {
        if !User::exists(user_id, &pool).await? {
            bail!("user {} does not exist", user_id);
        }
    }

    let deps = Arc::new(build_deps(&config, pool)?);
    let registry = build_pipeline_registry();

    let request = InvokeRequest::builder()
        .pipeline(name)
        .input(input)
        .user_id(user_id)
        .trigger(TriggerSource::Cli)
        .idempotency_key(idempotency_key.map(|k| format!("cli:{}", k)))
        .build();
    let outcome = registry.invoke(request, &deps).await?;

    output(&RunOutput {
        run: outcome.run.into(),
        replayed: outcome.replayed,
    })
}

async fn cmd_schedules() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = get_pool(&config).await?;

    let tasks: Vec<ScheduledTaskData> = ScheduledTask::list_all(&pool)
        .await?
        .into_iter()
        .map(ScheduledTaskData::from)
        .collect();
    output(&tasks)
}

async fn cmd_tick() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = get_pool(&config).await?;

    let deps = Arc::new(build_deps(&config, pool)?);
    let scheduler = Scheduler::new(Arc::new(build_pipeline_registry()), deps);
    let report = scheduler.tick(Utc::now()).await?;
    output(&report)
}
