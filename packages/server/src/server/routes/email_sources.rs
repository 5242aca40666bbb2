//! `/api/email-sources`: connected mailboxes.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::common::EmailSourceId;
use crate::domains::email::{EmailSource, EmailSourceData, NewEmailSource};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn list_email_sources(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<EmailSourceData>>, ApiError> {
    let sources = EmailSource::list_for_user(auth.user_id, &state.db_pool).await?;
    Ok(Json(sources.into_iter().map(EmailSourceData::from).collect()))
}

/// Connect a mailbox. Reconnecting an address refreshes its tokens.
pub async fn connect_email_source(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(input): Json<NewEmailSource>,
) -> Result<(StatusCode, Json<EmailSourceData>), ApiError> {
    if input.provider.trim().is_empty() || !input.address.contains('@') {
        return Err(ApiError::BadRequest(
            "email source needs a provider and an email address".to_string(),
        ));
    }
    ensure_user(&auth, &state.db_pool).await?;
    let source = EmailSource::upsert(auth.user_id, &input, &state.db_pool).await?;
    Ok((StatusCode::CREATED, Json(source.into())))
}

pub async fn get_email_source(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<EmailSourceId>,
) -> Result<Json<EmailSourceData>, ApiError> {
    EmailSource::find_for_user(id, auth.user_id, &state.db_pool)
        .await?
        .map(|source| Json(source.into()))
        .ok_or_else(|| ApiError::not_found("email source"))
}

pub async fn set_email_source_enabled(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<EmailSourceId>,
    Json(request): Json<SetEnabledRequest>,
) -> Result<Json<EmailSourceData>, ApiError> {
    EmailSource::set_enabled(id, auth.user_id, request.enabled, &state.db_pool)
        .await?
        .map(|source| Json(source.into()))
        .ok_or_else(|| ApiError::not_found("email source"))
}

pub async fn delete_email_source(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<EmailSourceId>,
) -> Result<StatusCode, ApiError> {
    if EmailSource::delete(id, auth.user_id, &state.db_pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("email source"))
    }
}
