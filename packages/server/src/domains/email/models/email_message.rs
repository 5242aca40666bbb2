use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{EmailMessageId, EmailSourceId, JobPostingId, UserId};
use crate::kernel::IncomingEmail;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailMessage {
    pub id: EmailMessageId,
    pub email_source_id: EmailSourceId,
    pub user_id: UserId,
    pub provider_message_id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body: String,
    pub job_posting_id: Option<JobPostingId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailMessage {
    /// Store a message unless this source already has it.
    /// Returns `None` for a message seen before.
    pub async fn insert_if_new(
        source_id: EmailSourceId,
        user_id: UserId,
        email: &IncomingEmail,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO email_messages (
                id, email_source_id, user_id, provider_message_id, subject, sender, received_at, body
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email_source_id, provider_message_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(EmailMessageId::new())
        .bind(source_id)
        .bind(user_id)
        .bind(&email.provider_message_id)
        .bind(&email.subject)
        .bind(&email.sender)
        .bind(email.received_at)
        .bind(&email.body)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn link_job(id: EmailMessageId, job_id: JobPostingId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE email_messages SET job_posting_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(job_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn count_for_source(source_id: EmailSourceId, pool: &PgPool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM email_messages WHERE email_source_id = $1",
        )
        .bind(source_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
