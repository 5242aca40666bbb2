use anyhow::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::utils::job_fingerprint;
use crate::common::{JobPostingId, UserId, ValidatedPage};
use crate::domains::jobs::activities::scoring::ScoreBreakdown;
use crate::kernel::ExtractedJob;

/// Where a posting sits in the user's application funnel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, sqlx::Type,
)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    New,
    Saved,
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Archived,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobPosting {
    pub id: JobPostingId,
    pub user_id: UserId,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub remote: bool,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: Option<String>,
    pub description: String,
    pub source: String,
    pub status: JobStatus,
    pub fingerprint: String,
    pub score: Option<i32>,
    pub score_breakdown: Option<Json<ScoreBreakdown>>,
    pub scored_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row returned by an upsert, with whether it was newly inserted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UpsertedJob {
    #[sqlx(flatten)]
    pub job: JobPosting,
    pub inserted: bool,
}

/// Partial update (`PUT /api/jobs/:id`). Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobUpdate {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub remote: Option<bool>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub min_score: Option<i32>,
}

impl JobPosting {
    /// Insert a posting, or merge it into the existing one with the same
    /// fingerprint. Merging keeps the longer description and fills gaps.
    pub async fn upsert(
        user_id: UserId,
        job: &ExtractedJob,
        source: &str,
        pool: &PgPool,
    ) -> Result<UpsertedJob> {
        let fingerprint = job_fingerprint(&job.company, &job.title, job.location.as_deref());

        sqlx::query_as::<_, UpsertedJob>(
            r#"
            INSERT INTO job_postings (
                id, user_id, title, company, location, remote, salary_min, salary_max,
                url, description, source, fingerprint
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id, fingerprint) DO UPDATE
                SET remote = job_postings.remote OR EXCLUDED.remote,
                    salary_min = COALESCE(EXCLUDED.salary_min, job_postings.salary_min),
                    salary_max = COALESCE(EXCLUDED.salary_max, job_postings.salary_max),
                    url = COALESCE(job_postings.url, EXCLUDED.url),
                    description = CASE
                        WHEN length(EXCLUDED.description) > length(job_postings.description)
                        THEN EXCLUDED.description
                        ELSE job_postings.description
                    END,
                    updated_at = NOW()
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(JobPostingId::new())
        .bind(user_id)
        .bind(job.title.trim())
        .bind(job.company.trim())
        .bind(job.location.as_deref().map(str::trim))
        .bind(job.remote)
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(job.url.as_deref())
        .bind(&job.description)
        .bind(source)
        .bind(fingerprint)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for_user(
        id: JobPostingId,
        user_id: UserId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM job_postings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Newest first. Fetches one look-ahead row (see `ValidatedPage`).
    pub async fn list_for_user(
        user_id: UserId,
        filter: &JobFilter,
        page: &ValidatedPage,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM job_postings
            WHERE user_id = $1
              AND ($2::job_status IS NULL OR status = $2)
              AND ($3::int IS NULL OR score >= $3)
              AND ($4::uuid IS NULL OR id < $4)
            ORDER BY id DESC
            LIMIT $5
            "#,
        )
        .bind(user_id)
        .bind(filter.status)
        .bind(filter.min_score)
        .bind(page.after)
        .bind(page.fetch_limit())
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn update(
        id: JobPostingId,
        user_id: UserId,
        update: &JobUpdate,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE job_postings SET
                title = COALESCE($3, title),
                company = COALESCE($4, company),
                location = COALESCE($5, location),
                remote = COALESCE($6, remote),
                salary_min = COALESCE($7, salary_min),
                salary_max = COALESCE($8, salary_max),
                url = COALESCE($9, url),
                description = COALESCE($10, description),
                status = COALESCE($11, status),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(update.title.as_deref())
        .bind(update.company.as_deref())
        .bind(update.location.as_deref())
        .bind(update.remote)
        .bind(update.salary_min)
        .bind(update.salary_max)
        .bind(update.url.as_deref())
        .bind(update.description.as_deref())
        .bind(update.status)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(id: JobPostingId, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM job_postings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Postings to (re)score. Archived and rejected postings are skipped.
    pub async fn find_for_scoring(
        user_id: UserId,
        include_scored: bool,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM job_postings
            WHERE user_id = $1
              AND status NOT IN ('archived', 'rejected')
              AND ($2 OR score IS NULL)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(include_scored)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_score(
        id: JobPostingId,
        breakdown: &ScoreBreakdown,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE job_postings
            SET score = $2, score_breakdown = $3, scored_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(breakdown.total)
        .bind(Json(breakdown))
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Best-scoring postings created since `since`, highest score first.
    pub async fn find_top_since(
        user_id: UserId,
        min_score: i32,
        since: DateTime<Utc>,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM job_postings
            WHERE user_id = $1
              AND score >= $2
              AND created_at >= $3
              AND status <> 'archived'
            ORDER BY score DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(min_score)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Archive `new`/`saved` postings nobody touched since `older_than`.
    pub async fn archive_stale(
        user_id: UserId,
        older_than: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_postings SET status = 'archived', updated_at = NOW()
            WHERE user_id = $1
              AND status IN ('new', 'saved')
              AND updated_at < $2
            "#,
        )
        .bind(user_id)
        .bind(older_than)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
