// HTTP routes
pub mod assistant;
pub mod email_sources;
pub mod health;
pub mod jobs;
pub mod pipelines;
pub mod profile;
pub mod resumes;
pub mod scheduled_tasks;
pub mod scrape_sources;
pub mod webhooks;
pub mod ws;

pub use health::*;

use sqlx::PgPool;

use crate::domains::users::User;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;

/// Mirror the token's user into `users` before writing rows that reference it.
pub(crate) async fn ensure_user(auth: &AuthUser, pool: &PgPool) -> Result<(), ApiError> {
    User::upsert(auth.user_id, &auth.email, None, pool).await?;
    Ok(())
}

/// The `Idempotency-Key` header, if present and non-blank.
pub(crate) fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
