mod adapters;
mod config;
mod db;
mod error;
mod models;
mod pipeline;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config};
use crate::models::scrape_run::ScrapeRun;
use crate::models::source::{CreateSource, JobSource};
use crate::pipeline::orchestrator::{self, RunConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobscout=info")),
        )
        .init();

    let config = Config::parse();

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    // Runs left 'running' by a crashed worker
    let stale = ScrapeRun::recover_stale(&pool).await?;
    if stale > 0 {
        tracing::warn!("Recovered {stale} stale runs");
    }

    match config.command {
        Command::Run { scrape } => {
            let summary = orchestrator::run_once(&pool, &RunConfig::from_args(&scrape)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Watch { scrape, interval } => {
            orchestrator::watch(pool, RunConfig::from_args(&scrape), interval).await?;
        }
        Command::AddSource {
            name,
            source_type,
            config: blob,
            company_id,
            aggregator_domain,
            validation_policy,
            tier,
        } => {
            let source = JobSource::create(
                &pool,
                CreateSource {
                    name,
                    source_type,
                    config: serde_json::from_str(&blob)?,
                    company_id,
                    aggregator_domain,
                    validation_policy,
                    tier,
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&source)?);
        }
        Command::Repair { id, config: blob } => {
            let source = JobSource::repair(&pool, id, serde_json::from_str(&blob)?).await?;
            tracing::info!(source = %source.name, "Source repaired and re-activated");
            println!("{}", serde_json::to_string_pretty(&source)?);
        }
        Command::DeleteSource { id } => {
            JobSource::soft_delete(&pool, id).await?;
            println!("Source {id} deleted");
        }
        Command::Runs { limit } => {
            let runs = ScrapeRun::recent(&pool, limit).await?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }

    Ok(())
}
