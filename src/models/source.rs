use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::pipeline::health::HealthUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, sqlx::Type)]
#[sqlx(type_name = "source_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Api,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "source_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Failed,
    Disabled,
    Deleted,
}

/// Whether zero results from an otherwise healthy fetch counts against the
/// source. Sources for companies that hire rarely use `AllowEmpty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, sqlx::Type)]
#[sqlx(type_name = "validation_policy", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    Strict,
    AllowEmpty,
}

/// One scrapable endpoint. Tied to exactly one employer (`company_id`) or
/// flagged as a multi-employer platform (`aggregator_domain`), never both.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobSource {
    pub id: i32,
    pub name: String,
    pub source_type: SourceType,
    pub status: SourceStatus,
    pub config: serde_json::Value,
    pub company_id: Option<i32>,
    pub aggregator_domain: Option<String>,
    pub consecutive_zero_jobs: i32,
    pub consecutive_failures: i32,
    pub validation_policy: ValidationPolicy,
    pub tier: i32,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSource {
    pub name: String,
    pub source_type: SourceType,
    pub config: serde_json::Value,
    pub company_id: Option<i32>,
    pub aggregator_domain: Option<String>,
    pub validation_policy: Option<ValidationPolicy>,
    pub tier: Option<i32>,
}

impl JobSource {
    /// All non-deleted sources, in insertion order. Rotation and the
    /// aggregator guard both work from this set.
    pub async fn list(pool: &PgPool) -> Result<Vec<JobSource>, AppError> {
        let sources = sqlx::query_as::<_, JobSource>(
            "SELECT * FROM job_sources WHERE status <> 'deleted' ORDER BY id",
        )
        .fetch_all(pool)
        .await?;
        Ok(sources)
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<JobSource, AppError> {
        sqlx::query_as::<_, JobSource>("SELECT * FROM job_sources WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Source {id} not found")))
    }

    pub async fn create(pool: &PgPool, input: CreateSource) -> Result<JobSource, AppError> {
        if input.company_id.is_some() == input.aggregator_domain.is_some() {
            return Err(AppError::InvalidSource(
                "exactly one of company_id or aggregator_domain must be set".to_string(),
            ));
        }
        let source = sqlx::query_as::<_, JobSource>(
            "INSERT INTO job_sources (name, source_type, config, company_id, aggregator_domain, validation_policy, tier) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&input.name)
        .bind(input.source_type)
        .bind(&input.config)
        .bind(input.company_id)
        .bind(&input.aggregator_domain)
        .bind(input.validation_policy.unwrap_or(ValidationPolicy::Strict))
        .bind(input.tier.unwrap_or(1))
        .fetch_one(pool)
        .await?;
        Ok(source)
    }

    /// Persist a health-tracker transition. This is the only write path for
    /// the counters and for automatic status changes; `last_scraped_at`
    /// advances on every attempt so rotation stays fair.
    pub async fn record_outcome(
        pool: &PgPool,
        id: i32,
        update: &HealthUpdate,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE job_sources SET consecutive_zero_jobs = $2, consecutive_failures = $3, \
             status = $4, last_scraped_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(update.consecutive_zero_jobs)
        .bind(update.consecutive_failures)
        .bind(update.status)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Operator repair: corrected config, counters cleared, back to active.
    /// The only way a failed or disabled source re-enters rotation.
    pub async fn repair(
        pool: &PgPool,
        id: i32,
        config: serde_json::Value,
    ) -> Result<JobSource, AppError> {
        let source = sqlx::query_as::<_, JobSource>(
            "UPDATE job_sources SET config = $2, status = 'active', consecutive_zero_jobs = 0, \
             consecutive_failures = 0, updated_at = NOW() WHERE id = $1 AND status <> 'deleted' \
             RETURNING *",
        )
        .bind(id)
        .bind(&config)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Source {id} not found")))?;
        Ok(source)
    }

    /// Soft delete; scrape history stays attached. Terminal.
    pub async fn soft_delete(pool: &PgPool, id: i32) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE job_sources SET status = 'deleted', updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Source {id} not found")));
        }
        Ok(())
    }
}
