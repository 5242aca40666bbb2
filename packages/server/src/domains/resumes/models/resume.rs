use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use crate::common::{ResumeId, UserId};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Resume {
    pub id: ResumeId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeInput {
    pub title: String,
    pub content: String,
}

impl Resume {
    /// The user's first resume becomes primary automatically.
    pub async fn create(user_id: UserId, input: &ResumeInput, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO resumes (id, user_id, title, content, is_primary)
            VALUES ($1, $2, $3, $4, NOT EXISTS (SELECT 1 FROM resumes WHERE user_id = $2))
            RETURNING *
            "#,
        )
        .bind(ResumeId::new())
        .bind(user_id)
        .bind(input.title.trim())
        .bind(&input.content)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list_for_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY is_primary DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for_user(id: ResumeId, user_id: UserId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_primary(user_id: UserId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM resumes WHERE user_id = $1 AND is_primary")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn update(
        id: ResumeId,
        user_id: UserId,
        input: &ResumeInput,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE resumes SET title = $3, content = $4, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(input.title.trim())
        .bind(&input.content)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Make this resume the primary one, clearing the flag on the others.
    pub async fn set_primary(id: ResumeId, user_id: UserId, pool: &PgPool) -> Result<Option<Self>> {
        let mut tx = pool.begin().await?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM resumes WHERE id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if !exists {
            return Ok(None);
        }

        sqlx::query("UPDATE resumes SET is_primary = FALSE, updated_at = NOW() WHERE user_id = $1 AND is_primary AND id <> $2")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let resume = sqlx::query_as::<_, Self>(
            "UPDATE resumes SET is_primary = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(resume))
    }

    pub async fn delete(id: ResumeId, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
