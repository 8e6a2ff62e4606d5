use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;

/// A hiring employer. `website` stays null until enrichment fills it; the
/// resolver guarantees it is never an aggregator platform's domain.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub async fn get(pool: &PgPool, id: i32) -> Result<Company, AppError> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Company {id} not found")))
    }

    /// Case-insensitive lookup by name, creating the row if missing.
    /// New companies get a null website; enrichment is out of scope here.
    pub async fn find_or_create(pool: &PgPool, name: &str) -> Result<Company, AppError> {
        if let Some(existing) =
            sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE LOWER(name) = LOWER($1)")
                .bind(name)
                .fetch_optional(pool)
                .await?
        {
            return Ok(existing);
        }
        // Racing workers hit the unique index; fall back to the winner's row.
        let inserted = sqlx::query_as::<_, Company>(
            "INSERT INTO companies (name) VALUES ($1) ON CONFLICT (LOWER(name)) DO NOTHING RETURNING *",
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;
        match inserted {
            Some(company) => Ok(company),
            None => sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE LOWER(name) = LOWER($1)")
                .bind(name)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Company '{name}' not found after insert"))),
        }
    }

    /// All companies with a recorded website, for the aggregator scrub pass.
    pub async fn list_with_website(pool: &PgPool) -> Result<Vec<Company>, AppError> {
        let companies =
            sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE website IS NOT NULL ORDER BY id")
                .fetch_all(pool)
                .await?;
        Ok(companies)
    }

    pub async fn clear_website(pool: &PgPool, id: i32) -> Result<(), AppError> {
        sqlx::query("UPDATE companies SET website = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
