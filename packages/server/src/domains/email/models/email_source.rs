use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use crate::common::{EmailSourceId, UserId};
use crate::kernel::MailboxCredentials;

/// A connected mailbox. Tokens are opaque to this server; the mailbox
/// bridge owns the OAuth exchange and refresh.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailSource {
    pub id: EmailSourceId,
    pub user_id: UserId,
    pub provider: String,
    pub address: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub sync_cursor: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEmailSource {
    pub provider: String,
    pub address: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl EmailSource {
    pub fn credentials(&self) -> MailboxCredentials {
        MailboxCredentials {
            provider: self.provider.clone(),
            address: self.address.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// Connect a mailbox; reconnecting the same address refreshes its tokens.
    pub async fn upsert(user_id: UserId, input: &NewEmailSource, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO email_sources (
                id, user_id, provider, address, access_token, refresh_token, token_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, address) DO UPDATE
                SET provider = EXCLUDED.provider,
                    access_token = EXCLUDED.access_token,
                    refresh_token = COALESCE(EXCLUDED.refresh_token, email_sources.refresh_token),
                    token_expires_at = EXCLUDED.token_expires_at,
                    enabled = TRUE,
                    updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(EmailSourceId::new())
        .bind(user_id)
        .bind(input.provider.trim().to_lowercase())
        .bind(input.address.trim().to_lowercase())
        .bind(input.access_token.as_deref())
        .bind(input.refresh_token.as_deref())
        .bind(input.token_expires_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list_for_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM email_sources WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_enabled_for_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM email_sources WHERE user_id = $1 AND enabled ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for_user(
        id: EmailSourceId,
        user_id: UserId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM email_sources WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn set_enabled(
        id: EmailSourceId,
        user_id: UserId,
        enabled: bool,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE email_sources SET enabled = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(enabled)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Advance the sync cursor. A `None` cursor keeps the current one.
    pub async fn record_sync(
        id: EmailSourceId,
        cursor: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE email_sources
            SET sync_cursor = COALESCE($2, sync_cursor), last_synced_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(cursor)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(id: EmailSourceId, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_sources WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
