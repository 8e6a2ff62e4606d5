use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;
use crate::pipeline::orchestrator::RunSummary;

/// Per-run bookkeeping row, read by the admin UI for observability.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScrapeRun {
    pub id: i32,
    pub status: String,
    pub sources_attempted: i32,
    pub sources_succeeded: i32,
    pub sources_failed: i32,
    pub sources_empty: i32,
    pub listings_new: i32,
    pub listings_updated: i32,
    pub listings_duplicate: i32,
    pub listings_needs_review: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScrapeRun {
    pub async fn start(pool: &PgPool) -> Result<ScrapeRun, AppError> {
        let run = sqlx::query_as::<_, ScrapeRun>(
            "INSERT INTO scrape_runs DEFAULT VALUES RETURNING *",
        )
        .fetch_one(pool)
        .await?;
        Ok(run)
    }

    pub async fn finish(pool: &PgPool, id: i32, summary: &RunSummary) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE scrape_runs SET status = 'finished', sources_attempted = $2, \
             sources_succeeded = $3, sources_failed = $4, sources_empty = $5, \
             listings_new = $6, listings_updated = $7, listings_duplicate = $8, \
             listings_needs_review = $9, finished_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(summary.sources_attempted as i32)
        .bind(summary.sources_succeeded as i32)
        .bind(summary.sources_failed as i32)
        .bind(summary.sources_empty as i32)
        .bind(summary.listings_new as i32)
        .bind(summary.listings_updated as i32)
        .bind(summary.listings_duplicate as i32)
        .bind(summary.listings_needs_review as i32)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(pool: &PgPool, id: i32, error: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE scrape_runs SET status = 'failed', error = $2, finished_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark runs left in 'running' by a crashed worker as aborted.
    pub async fn recover_stale(pool: &PgPool) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE scrape_runs SET status = 'aborted', finished_at = NOW() WHERE status = 'running'",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<ScrapeRun>, AppError> {
        let runs = sqlx::query_as::<_, ScrapeRun>(
            "SELECT * FROM scrape_runs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(runs)
    }
}
