use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ProfileId, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "remote_preference", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RemotePreference {
    RemoteOnly,
    Hybrid,
    Onsite,
    #[default]
    Any,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Profile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub target_titles: Vec<String>,
    pub skills: Vec<String>,
    pub preferred_locations: Vec<String>,
    pub remote_preference: RemotePreference,
    pub min_salary: Option<i32>,
    pub excluded_keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of a profile's preferences (`PUT /api/profile`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileInput {
    pub target_titles: Vec<String>,
    pub skills: Vec<String>,
    pub preferred_locations: Vec<String>,
    pub remote_preference: RemotePreference,
    pub min_salary: Option<i32>,
    pub excluded_keywords: Vec<String>,
}

impl ProfileInput {
    /// Trim entries and drop blanks and duplicates (case-insensitive).
    pub fn normalized(mut self) -> Self {
        fn clean(values: Vec<String>) -> Vec<String> {
            let mut seen = std::collections::HashSet::new();
            values
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && seen.insert(v.to_lowercase()))
                .collect()
        }

        self.target_titles = clean(self.target_titles);
        self.skills = clean(self.skills);
        self.preferred_locations = clean(self.preferred_locations);
        self.excluded_keywords = clean(self.excluded_keywords);
        self.min_salary = self.min_salary.filter(|s| *s > 0);
        self
    }
}

impl Profile {
    pub async fn find_by_user(user_id: UserId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn upsert(user_id: UserId, input: ProfileInput, pool: &PgPool) -> Result<Self> {
        let input = input.normalized();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO profiles (
                id, user_id, target_titles, skills, preferred_locations,
                remote_preference, min_salary, excluded_keywords
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE
                SET target_titles = EXCLUDED.target_titles,
                    skills = EXCLUDED.skills,
                    preferred_locations = EXCLUDED.preferred_locations,
                    remote_preference = EXCLUDED.remote_preference,
                    min_salary = EXCLUDED.min_salary,
                    excluded_keywords = EXCLUDED.excluded_keywords,
                    updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(ProfileId::new())
        .bind(user_id)
        .bind(&input.target_titles)
        .bind(&input.skills)
        .bind(&input.preferred_locations)
        .bind(input.remote_preference)
        .bind(input.min_salary)
        .bind(&input.excluded_keywords)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_drops_blanks_and_duplicates() {
        let input = ProfileInput {
            skills: vec![" Rust ".into(), "rust".into(), "".into(), "Go".into()],
            min_salary: Some(0),
            ..Default::default()
        }
        .normalized();

        assert_eq!(input.skills, vec!["Rust", "Go"]);
        assert_eq!(input.min_salary, None);
    }

    #[test]
    fn test_remote_preference_wire_format() {
        let pref: RemotePreference = serde_json::from_str("\"remote_only\"").unwrap();
        assert_eq!(pref, RemotePreference::RemoteOnly);
        assert_eq!(RemotePreference::default(), RemotePreference::Any);
    }
}
