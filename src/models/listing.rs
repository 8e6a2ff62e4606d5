use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;

/// Canonical persisted listing. Identity is the URL fingerprint; the
/// content hash decides duplicate-vs-updated on re-encounter.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobListing {
    pub id: i32,
    pub fingerprint: String,
    pub content_hash: String,
    pub source_id: Option<i32>,
    pub company_id: Option<i32>,
    pub title: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub canonical_url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub needs_review: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateListing {
    pub fingerprint: String,
    pub content_hash: String,
    pub source_id: i32,
    pub company_id: Option<i32>,
    pub title: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub canonical_url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub needs_review: bool,
}

impl JobListing {
    /// Batch existence check for one source's candidate set. One query per
    /// batch, never one per record.
    pub async fn find_by_fingerprints(
        pool: &PgPool,
        fingerprints: &[String],
    ) -> Result<Vec<JobListing>, AppError> {
        if fingerprints.is_empty() {
            return Ok(Vec::new());
        }
        let listings = sqlx::query_as::<_, JobListing>(
            "SELECT * FROM job_listings WHERE fingerprint = ANY($1)",
        )
        .bind(fingerprints)
        .fetch_all(pool)
        .await?;
        Ok(listings)
    }

    pub async fn create(pool: &PgPool, input: CreateListing) -> Result<JobListing, AppError> {
        let listing = sqlx::query_as::<_, JobListing>(
            "INSERT INTO job_listings (fingerprint, content_hash, source_id, company_id, title, \
             location, description, canonical_url, posted_at, needs_review) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(&input.fingerprint)
        .bind(&input.content_hash)
        .bind(input.source_id)
        .bind(input.company_id)
        .bind(&input.title)
        .bind(&input.location)
        .bind(&input.description)
        .bind(&input.canonical_url)
        .bind(input.posted_at)
        .bind(input.needs_review)
        .fetch_one(pool)
        .await?;
        Ok(listing)
    }

    /// Content changed under the same fingerprint: replace it, keep
    /// `first_seen_at`. Employer attribution is refreshed too, so a listing
    /// first seen without an employer leaves the review queue once a later
    /// record names one.
    pub async fn update_content(
        pool: &PgPool,
        id: i32,
        input: &CreateListing,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE job_listings SET content_hash = $2, title = $3, location = $4, \
             description = $5, posted_at = $6, company_id = $7, needs_review = $8, \
             last_seen_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(&input.content_hash)
        .bind(&input.title)
        .bind(&input.location)
        .bind(&input.description)
        .bind(input.posted_at)
        .bind(input.company_id)
        .bind(input.needs_review)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Unchanged duplicate: only refresh the sighting timestamp.
    pub async fn mark_seen(pool: &PgPool, id: i32) -> Result<(), AppError> {
        sqlx::query("UPDATE job_listings SET last_seen_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
