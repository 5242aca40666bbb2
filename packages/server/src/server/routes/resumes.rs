//! `/api/resumes`

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::common::utils::{extract_keywords, COMMON_SKILLS};
use crate::common::ResumeId;
use crate::domains::profiles::Profile;
use crate::domains::resumes::{Resume, ResumeData, ResumeInput};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;

/// A resume with the skill keywords found in it.
#[derive(Debug, Serialize)]
pub struct ResumeDetail {
    #[serde(flatten)]
    pub resume: ResumeData,
    pub keywords: Vec<String>,
}

fn check_input(input: &ResumeInput) -> Result<(), ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("resume title cannot be empty".to_string()));
    }
    Ok(())
}

pub async fn list_resumes(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ResumeData>>, ApiError> {
    let resumes = Resume::list_for_user(auth.user_id, &state.db_pool).await?;
    Ok(Json(resumes.into_iter().map(ResumeData::from).collect()))
}

pub async fn create_resume(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(input): Json<ResumeInput>,
) -> Result<(StatusCode, Json<ResumeData>), ApiError> {
    check_input(&input)?;
    ensure_user(&auth, &state.db_pool).await?;
    let resume = Resume::create(auth.user_id, &input, &state.db_pool).await?;
    Ok((StatusCode::CREATED, Json(resume.into())))
}

pub async fn get_resume(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ResumeId>,
) -> Result<Json<ResumeDetail>, ApiError> {
    let resume = Resume::find_for_user(id, auth.user_id, &state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("resume"))?;

    let profile_skills = Profile::find_by_user(auth.user_id, &state.db_pool)
        .await?
        .map(|p| p.skills)
        .unwrap_or_default();
    let vocabulary = profile_skills
        .iter()
        .map(String::as_str)
        .chain(COMMON_SKILLS.iter().copied());
    let keywords = extract_keywords(&resume.content, vocabulary);

    Ok(Json(ResumeDetail {
        resume: resume.into(),
        keywords,
    }))
}

pub async fn update_resume(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ResumeId>,
    Json(input): Json<ResumeInput>,
) -> Result<Json<ResumeData>, ApiError> {
    check_input(&input)?;
    Resume::update(id, auth.user_id, &input, &state.db_pool)
        .await?
        .map(|resume| Json(resume.into()))
        .ok_or_else(|| ApiError::not_found("resume"))
}

pub async fn set_primary_resume(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ResumeId>,
) -> Result<Json<ResumeData>, ApiError> {
    Resume::set_primary(id, auth.user_id, &state.db_pool)
        .await?
        .map(|resume| Json(resume.into()))
        .ok_or_else(|| ApiError::not_found("resume"))
}

pub async fn delete_resume(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Path(id): Path<ResumeId>,
) -> Result<StatusCode, ApiError> {
    if Resume::delete(id, auth.user_id, &state.db_pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("resume"))
    }
}
