use serde::Serialize;

use crate::domains::profiles::models::{Profile, RemotePreference};

#[derive(Debug, Clone, Serialize)]
pub struct ProfileData {
    pub id: String,
    pub target_titles: Vec<String>,
    pub skills: Vec<String>,
    pub preferred_locations: Vec<String>,
    pub remote_preference: RemotePreference,
    pub min_salary: Option<i32>,
    pub excluded_keywords: Vec<String>,
    pub updated_at: String,
}

impl From<Profile> for ProfileData {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id.to_string(),
            target_titles: profile.target_titles,
            skills: profile.skills,
            preferred_locations: profile.preferred_locations,
            remote_preference: profile.remote_preference,
            min_salary: profile.min_salary,
            excluded_keywords: profile.excluded_keywords,
            updated_at: profile.updated_at.to_rfc3339(),
        }
    }
}
