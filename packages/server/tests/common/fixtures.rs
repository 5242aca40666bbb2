//! Test fixtures for creating test data.
//!
//! These fixtures use the model methods directly to create test data.

use anyhow::Result;
use sqlx::PgPool;

use jobtrack_core::common::UserId;
use jobtrack_core::domains::profiles::{Profile, ProfileInput, RemotePreference};
use jobtrack_core::domains::resumes::{Resume, ResumeInput};
use jobtrack_core::kernel::ExtractedJob;

/// A posting as an extractor would return it.
pub fn extracted_job(title: &str, company: &str, description: &str) -> ExtractedJob {
    ExtractedJob {
        title: title.to_string(),
        company: company.to_string(),
        location: Some("Berlin, Germany".to_string()),
        remote: false,
        salary_min: Some(90_000),
        salary_max: Some(120_000),
        url: Some(format!(
            "https://jobs.example.com/{}",
            title.to_lowercase().replace(' ', "-")
        )),
        description: description.to_string(),
    }
}

/// Profile looking for Rust backend roles in Berlin.
pub async fn create_rust_profile(user_id: UserId, pool: &PgPool) -> Result<Profile> {
    Profile::upsert(
        user_id,
        ProfileInput {
            target_titles: vec!["Backend Engineer".to_string()],
            skills: vec!["rust".to_string(), "postgres".to_string()],
            preferred_locations: vec!["Berlin".to_string()],
            remote_preference: RemotePreference::Any,
            min_salary: Some(80_000),
            excluded_keywords: vec!["crypto".to_string()],
        },
        pool,
    )
    .await
}

pub async fn create_resume(user_id: UserId, title: &str, content: &str, pool: &PgPool) -> Result<Resume> {
    Resume::create(
        user_id,
        &ResumeInput {
            title: title.to_string(),
            content: content.to_string(),
        },
        pool,
    )
    .await
}
