use clap::Parser;

use crate::models::source::{SourceType, ValidationPolicy};

#[derive(Parser, Debug, Clone)]
#[command(name = "jobscout", about = "Job-board scrape worker")]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute a single scrape cycle and exit
    Run {
        #[command(flatten)]
        scrape: ScrapeArgs,
    },
    /// Run scrape cycles on an interval until interrupted
    Watch {
        #[command(flatten)]
        scrape: ScrapeArgs,

        /// Seconds between cycle starts
        #[arg(long, env = "SCRAPE_INTERVAL", default_value = "900")]
        interval: u64,
    },
    /// Register a new scrapable source
    AddSource {
        #[arg(long)]
        name: String,

        #[arg(long, value_enum)]
        source_type: SourceType,

        /// Source config blob as inline JSON
        #[arg(long)]
        config: String,

        /// Employer this source belongs to (company-specific sources)
        #[arg(long, conflicts_with = "aggregator_domain")]
        company_id: Option<i32>,

        /// Platform domain hosting many employers' jobs
        #[arg(long)]
        aggregator_domain: Option<String>,

        #[arg(long, value_enum)]
        validation_policy: Option<ValidationPolicy>,

        #[arg(long)]
        tier: Option<i32>,
    },
    /// Re-activate a failed or disabled source with a corrected config
    Repair {
        #[arg(long)]
        id: i32,

        /// Corrected config blob as inline JSON
        #[arg(long)]
        config: String,
    },
    /// Soft-delete a source, keeping its scrape history
    DeleteSource {
        #[arg(long)]
        id: i32,
    },
    /// Show recent scrape runs
    Runs {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// Maximum number of sources to scrape per cycle
    #[arg(long, env = "MAX_SOURCES", default_value = "25")]
    pub max_sources: usize,

    /// Explicit source ids, bypassing rotation (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub source_ids: Option<Vec<i32>>,

    /// Concurrent source fetches
    #[arg(long, env = "SCRAPE_CONCURRENCY", default_value = "4")]
    pub concurrency: usize,

    /// Soft deadline for the whole cycle, in seconds.
    /// Sources not yet started when it passes are left for the next run.
    #[arg(long, env = "RUN_DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// External headless-render command for requires_js sources
    #[arg(long, env = "RENDER_CMD")]
    pub render_cmd: Option<String>,
}
