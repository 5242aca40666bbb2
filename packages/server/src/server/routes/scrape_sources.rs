//! `/api/scrape-sources`: job feeds to scrape.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;

use crate::common::ScrapeSourceId;
use crate::domains::sources::{NewScrapeSource, ScrapeSource, ScrapeSourceData};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;

pub async fn list_scrape_sources(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ScrapeSourceData>>, ApiError> {
    let sources = ScrapeSource::list_for_user(auth.user_id, &state.db_pool).await?;
    Ok(Json(sources.into_iter().map(ScrapeSourceData::from).collect()))
}

pub async fn create_scrape_source(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(input): Json<NewScrapeSource>,
) -> Result<(StatusCode, Json<ScrapeSourceData>), ApiError> {
    let url = input.url.trim();
    if input.name.trim().is_empty() {
        return Err(ApiError::BadRequest("scrape source name cannot be empty".to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::BadRequest(
            "scrape source url must be http(s)".to_string(),
        ));
    }
    ensure_user(&auth, &state.db_pool).await?;
    let source = ScrapeSource::create(auth.user_id, &input, &state.db_pool).await?;
    Ok((StatusCode::CREATED, Json(source.into())))
}

pub async fn get_scrape_source(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ScrapeSourceId>,
) -> Result<Json<ScrapeSourceData>, ApiError> {
    ScrapeSource::find_for_user(id, auth.user_id, &state.db_pool)
        .await?
        .map(|source| Json(source.into()))
        .ok_or_else(|| ApiError::not_found("scrape source"))
}

pub async fn delete_scrape_source(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ScrapeSourceId>,
) -> Result<StatusCode, ApiError> {
    if ScrapeSource::delete(id, auth.user_id, &state.db_pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("scrape source"))
    }
}
