//! `GET /health`: liveness of the database plus what this instance serves.

use std::time::{Duration, Instant};

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AxumAppState;

const DB_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
pub struct HealthReport {
    status: Health,
    database: DatabaseProbe,
    pool: PoolStats,
    pipelines: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct DatabaseProbe {
    reachable: bool,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct PoolStats {
    open: u32,
    idle: usize,
    max: u32,
}

async fn probe_database(state: &AxumAppState) -> DatabaseProbe {
    let started = Instant::now();
    let result = tokio::time::timeout(
        DB_PROBE_TIMEOUT,
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db_pool),
    )
    .await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let error = match result {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("no answer within {}s", DB_PROBE_TIMEOUT.as_secs())),
    };
    DatabaseProbe {
        reachable: error.is_none(),
        latency_ms,
        error,
    }
}

/// 200 while Postgres answers, 503 otherwise. Pipelines and the scheduler
/// cannot make progress without it.
pub async fn health_handler(
    Extension(state): Extension<AxumAppState>,
) -> (StatusCode, Json<HealthReport>) {
    let database = probe_database(&state).await;
    let pool = PoolStats {
        open: state.db_pool.size(),
        idle: state.db_pool.num_idle(),
        max: state.db_pool.options().get_max_connections(),
    };

    let (code, status) = if database.reachable {
        (StatusCode::OK, Health::Healthy)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Health::Unhealthy)
    };

    (
        code,
        Json(HealthReport {
            status,
            database,
            pool,
            pipelines: state.registry.names(),
        }),
    )
}
