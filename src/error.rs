/// Fatal error surface: store access and invariant violations.
/// Per-source scrape failures use [`ScrapeError`] instead and never
/// abort a run.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Per-source failure taxonomy. `Fetch` is retryable on the next run;
/// `Extraction` means the config or a selector is stale and needs an
/// operator fix before the source can produce anything again.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("extraction failed: {0}")]
    Extraction(String),
}

impl ScrapeError {
    pub fn fetch(e: impl std::fmt::Display) -> Self {
        ScrapeError::Fetch(e.to_string())
    }
}
