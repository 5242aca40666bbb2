//! `/api/jobs`: the user's job postings.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::common::{JobPostingId, Page, PageParams};
use crate::domains::jobs::activities::{ingest_job, load_scoring_profile};
use crate::domains::jobs::{JobFilter, JobPosting, JobPostingData, JobUpdate};
use crate::kernel::ExtractedJob;
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(flatten)]
    pub job: ExtractedJob,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub created: bool,
    pub job: JobPostingData,
}

pub async fn list_jobs(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Query(filter): Query<JobFilter>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<JobPostingData>>, ApiError> {
    let page = params
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let rows = JobPosting::list_for_user(auth.user_id, &filter, &page, &state.db_pool).await?;
    Ok(Json(
        Page::from_rows(rows, &page, |job| job.id.into_uuid()).map(JobPostingData::from),
    ))
}

/// Add a posting by hand. Duplicates merge into the existing posting.
pub async fn create_job(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    if request.job.title.trim().is_empty() || request.job.company.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "job posting needs a title and a company".to_string(),
        ));
    }
    ensure_user(&auth, &state.db_pool).await?;

    let scoring = load_scoring_profile(auth.user_id, &state.db_pool).await?;
    let outcome = ingest_job(
        auth.user_id,
        &request.job,
        &request.source,
        scoring.as_ref(),
        &state.db_pool,
    )
    .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CreateJobResponse {
            created: outcome.created,
            job: outcome.job.into(),
        }),
    ))
}

pub async fn get_job(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<JobPostingId>,
) -> Result<Json<JobPostingData>, ApiError> {
    JobPosting::find_for_user(id, auth.user_id, &state.db_pool)
        .await?
        .map(|job| Json(job.into()))
        .ok_or_else(|| ApiError::not_found("job"))
}

pub async fn update_job(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<JobPostingId>,
    Json(update): Json<JobUpdate>,
) -> Result<Json<JobPostingData>, ApiError> {
    JobPosting::update(id, auth.user_id, &update, &state.db_pool)
        .await?
        .map(|job| Json(job.into()))
        .ok_or_else(|| ApiError::not_found("job"))
}

pub async fn delete_job(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<JobPostingId>,
) -> Result<StatusCode, ApiError> {
    if JobPosting::delete(id, auth.user_id, &state.db_pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("job"))
    }
}
