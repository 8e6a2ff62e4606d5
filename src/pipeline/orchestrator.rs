// One end-to-end scrape cycle: rotation -> bounded concurrent fetch ->
// single-writer resolve/dedup/persist/health phase. A source failing never
// aborts the run; only a store failure does.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::adapters::{FetchContext, RawJobRecord, SourceConfig, adapter_for};
use crate::config::ScrapeArgs;
use crate::error::{AppError, ScrapeError};
use crate::models::listing::{CreateListing, JobListing};
use crate::models::scrape_run::ScrapeRun;
use crate::models::source::JobSource;
use crate::pipeline::dedup::{self, Decision, RunDedup};
use crate::pipeline::health::{self, HealthPolicy, SourceOutcome};
use crate::pipeline::resolver::{self, AggregatorGuard};
use crate::pipeline::rotation::{self, SelectionConfig};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_sources: usize,
    pub source_ids: Option<Vec<i32>>,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
    pub request_timeout: Duration,
    pub render_cmd: Option<String>,
}

impl RunConfig {
    pub fn from_args(args: &ScrapeArgs) -> Self {
        Self {
            max_sources: args.max_sources,
            source_ids: args.source_ids.clone(),
            concurrency: args.concurrency.max(1),
            deadline: args.deadline_secs.map(Duration::from_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            render_cmd: args.render_cmd.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub sources_attempted: u32,
    pub sources_succeeded: u32,
    pub sources_failed: u32,
    pub sources_empty: u32,
    pub listings_new: u32,
    pub listings_updated: u32,
    pub listings_duplicate: u32,
    pub listings_needs_review: u32,
}

struct FetchTask {
    source: JobSource,
    /// None when the run deadline passed before this source started.
    result: Option<Result<Vec<RawJobRecord>, ScrapeError>>,
}

/// Run one scrape cycle and persist its outcome.
pub async fn run_once(pool: &PgPool, config: &RunConfig) -> Result<RunSummary, AppError> {
    let sources = JobSource::list(pool).await?;
    let guard = AggregatorGuard::from_sources(&sources);

    let scrubbed = resolver::scrub_aggregator_websites(pool, &guard).await?;
    if scrubbed > 0 {
        tracing::warn!("Scrubbed {scrubbed} aggregator-domain company websites");
    }

    let selection = SelectionConfig {
        max_sources: config.max_sources,
        source_ids: config.source_ids.clone(),
    };
    let selected = rotation::select_sources(&sources, &selection);
    if selected.is_empty() {
        tracing::info!("No sources eligible for this run");
        return Ok(RunSummary::default());
    }

    let run = ScrapeRun::start(pool).await?;
    tracing::info!(run_id = run.id, sources = selected.len(), "Scrape run started");

    let ctx = FetchContext {
        http: http_client(config)?,
        render_cmd: config.render_cmd.clone(),
    };
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let deadline = config.deadline.map(|d| Instant::now() + d);

    let mut tasks = JoinSet::new();
    for source in selected {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return FetchTask { source, result: None };
            };
            // Soft deadline: sources that have not started yet are left for
            // the next run; in-flight fetches finish under their own timeout.
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return FetchTask { source, result: None };
            }
            let result = collect_source(&ctx, &source).await;
            FetchTask { source, result: Some(result) }
        });
    }

    match record_results(pool, &mut tasks).await {
        Ok(summary) => {
            ScrapeRun::finish(pool, run.id, &summary).await?;
            tracing::info!(
                run_id = run.id,
                attempted = summary.sources_attempted,
                new = summary.listings_new,
                updated = summary.listings_updated,
                duplicate = summary.listings_duplicate,
                "Scrape run finished"
            );
            Ok(summary)
        }
        Err(e) => {
            let _ = ScrapeRun::mark_failed(pool, run.id, &e.to_string()).await;
            Err(e)
        }
    }
}

/// Poll loop: scrape on an interval until interrupted.
pub async fn watch(pool: PgPool, config: RunConfig, interval: u64) -> anyhow::Result<()> {
    tracing::info!("Worker started, scraping every {interval}s");
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, exiting gracefully");
                break;
            }
            _ = async {
                match run_once(&pool, &config).await {
                    Ok(summary) => tracing::debug!(?summary, "Cycle complete"),
                    Err(e) => tracing::error!("Scrape cycle failed: {e}"),
                }
                tokio::time::sleep(Duration::from_secs(interval)).await;
            } => {}
        }
    }
    Ok(())
}

fn http_client(config: &RunConfig) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))
}

async fn collect_source(
    ctx: &FetchContext,
    source: &JobSource,
) -> Result<Vec<RawJobRecord>, ScrapeError> {
    let config = SourceConfig::from_value(&source.config)?;
    let adapter = adapter_for(source.source_type, &config);
    tracing::debug!(source = %source.name, adapter = adapter.name(), "Fetching");
    adapter.collect(ctx, &config).await
}

/// Single-writer aggregation: dedup state, health counters and all store
/// writes happen here, serially, as the fetch pool drains.
async fn record_results(
    pool: &PgPool,
    tasks: &mut JoinSet<FetchTask>,
) -> Result<RunSummary, AppError> {
    let mut summary = RunSummary::default();
    let mut dedup = RunDedup::new();
    let policy = HealthPolicy::default();

    while let Some(joined) = tasks.join_next().await {
        let task = match joined {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("Fetch task panicked: {e}");
                continue;
            }
        };
        let Some(result) = task.result else {
            tracing::info!(source = %task.source.name, "Deadline passed before start; left for next run");
            continue;
        };

        summary.sources_attempted += 1;
        let outcome = match result {
            Ok(records) if records.is_empty() => {
                summary.sources_empty += 1;
                SourceOutcome::Empty
            }
            Ok(records) => {
                let found = records.len();
                ingest_records(pool, &task.source, records, &mut dedup, &mut summary).await?;
                summary.sources_succeeded += 1;
                tracing::info!(source = %task.source.name, jobs = found, "Scrape succeeded");
                SourceOutcome::Success(found)
            }
            Err(err) => {
                summary.sources_failed += 1;
                tracing::warn!(source = %task.source.name, "Scrape failed: {err}");
                SourceOutcome::from(&err)
            }
        };

        let update = health::apply_outcome(&task.source, outcome, &policy);
        if update.status != task.source.status {
            tracing::warn!(
                source = %task.source.name,
                from = ?task.source.status,
                to = ?update.status,
                "Source status transition"
            );
        }
        JobSource::record_outcome(pool, task.source.id, &update).await?;
    }

    Ok(summary)
}

/// Resolve, normalize and reconcile one source's records. Existence checks
/// against the store run once per batch, not per record.
async fn ingest_records(
    pool: &PgPool,
    source: &JobSource,
    records: Vec<RawJobRecord>,
    dedup: &mut RunDedup,
    summary: &mut RunSummary,
) -> Result<(), AppError> {
    let mut candidates: Vec<CreateListing> = Vec::new();
    for record in records {
        let normalized = match dedup::normalize_url(&record.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(source = %source.name, "Skipping record: {e}");
                continue;
            }
        };
        let fp = dedup::fingerprint(&normalized);
        if !dedup.first_sighting(&fp) {
            summary.listings_duplicate += 1;
            continue;
        }

        let employer =
            resolver::resolve_employer(pool, source, record.company.as_deref()).await?;
        if let Some(company) = employer.company_name.as_deref() {
            tracing::debug!(source = %source.name, company, title = %record.title, "Employer attributed");
        }
        candidates.push(CreateListing {
            fingerprint: fp,
            content_hash: dedup::content_hash(&record.title, record.description.as_deref()),
            source_id: source.id,
            company_id: employer.company_id,
            title: record.title,
            location: record.location,
            description: record.description,
            canonical_url: normalized,
            posted_at: record.posted_at,
            needs_review: employer.needs_review,
        });
    }

    let fingerprints: Vec<String> = candidates.iter().map(|c| c.fingerprint.clone()).collect();
    let existing = JobListing::find_by_fingerprints(pool, &fingerprints).await?;

    for candidate in candidates {
        let persisted = existing.iter().find(|l| l.fingerprint == candidate.fingerprint);
        match dedup::reconcile(&candidate.content_hash, persisted) {
            Decision::New => {
                JobListing::create(pool, candidate.clone()).await?;
                summary.listings_new += 1;
                if candidate.needs_review {
                    summary.listings_needs_review += 1;
                }
            }
            Decision::Updated { id } => {
                JobListing::update_content(pool, id, &candidate).await?;
                summary.listings_updated += 1;
                if candidate.needs_review {
                    summary.listings_needs_review += 1;
                }
            }
            Decision::Duplicate { id } => {
                JobListing::mark_seen(pool, id).await?;
                summary.listings_duplicate += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_clamps_concurrency() {
        let args = ScrapeArgs {
            max_sources: 10,
            source_ids: None,
            concurrency: 0,
            deadline_secs: Some(60),
            request_timeout_secs: 30,
            render_cmd: None,
        };
        let config = RunConfig::from_args(&args);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.deadline, Some(Duration::from_secs(60)));
    }
}
