use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ScrapeSourceId, UserId};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeSource {
    pub id: ScrapeSourceId,
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewScrapeSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeSourceData {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub last_scraped_at: Option<String>,
}

impl From<ScrapeSource> for ScrapeSourceData {
    fn from(source: ScrapeSource) -> Self {
        Self {
            id: source.id.to_string(),
            name: source.name,
            url: source.url,
            enabled: source.enabled,
            last_scraped_at: source.last_scraped_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl ScrapeSource {
    pub async fn create(user_id: UserId, input: &NewScrapeSource, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO scrape_sources (id, user_id, name, url) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(ScrapeSourceId::new())
        .bind(user_id)
        .bind(input.name.trim())
        .bind(input.url.trim())
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list_for_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scrape_sources WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_enabled_for_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scrape_sources WHERE user_id = $1 AND enabled ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for_user(
        id: ScrapeSourceId,
        user_id: UserId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scrape_sources WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn mark_scraped(id: ScrapeSourceId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE scrape_sources SET last_scraped_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(id: ScrapeSourceId, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scrape_sources WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
