//! `/api/profile`: the user's single search profile.

use axum::extract::Extension;
use axum::Json;

use crate::domains::profiles::{Profile, ProfileData, ProfileInput};
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;
use crate::server::routes::ensure_user;

pub async fn get_profile(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
) -> Result<Json<ProfileData>, ApiError> {
    Profile::find_by_user(auth.user_id, &state.db_pool)
        .await?
        .map(|profile| Json(profile.into()))
        .ok_or_else(|| ApiError::not_found("profile"))
}

/// Create or replace the profile.
pub async fn put_profile(
    Extension(state): Extension<AxumAppState>,
    auth: AuthUser,
    Json(input): Json<ProfileInput>,
) -> Result<Json<ProfileData>, ApiError> {
    if input.min_salary.is_some_and(|s| s < 0) {
        return Err(ApiError::BadRequest("min_salary cannot be negative".to_string()));
    }
    ensure_user(&auth, &state.db_pool).await?;
    let profile = Profile::upsert(auth.user_id, input, &state.db_pool).await?;
    Ok(Json(profile.into()))
}
