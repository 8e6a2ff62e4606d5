// Source health tracking. "Returns nothing" and "is broken" are separate
// signals with separate thresholds and separate terminal states, so
// operators can triage hiring freezes differently from stale selectors.

use crate::error::ScrapeError;
use crate::models::source::{JobSource, SourceStatus, ValidationPolicy};

/// Outcome of one scrape attempt, as seen by the health tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Fetch and extraction succeeded with at least one record.
    Success(usize),
    /// Well-formed response, zero records.
    Empty,
    /// Network-level failure; retryable next run.
    FetchError,
    /// Config/selector mismatch; will not heal without a repair.
    ExtractionError,
}

impl From<&ScrapeError> for SourceOutcome {
    fn from(err: &ScrapeError) -> Self {
        match err {
            ScrapeError::Fetch(_) => SourceOutcome::FetchError,
            ScrapeError::Extraction(_) => SourceOutcome::ExtractionError,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    /// Consecutive empty results before a strict source goes `failed`.
    pub zero_result_threshold: i32,
    /// Consecutive errors before a source goes `disabled`.
    pub failure_threshold: i32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            zero_result_threshold: 4,
            failure_threshold: 3,
        }
    }
}

/// The state a source should transition to after an outcome. Persisted in
/// one place ([`JobSource::record_outcome`]); nothing else mutates the
/// counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthUpdate {
    pub consecutive_zero_jobs: i32,
    pub consecutive_failures: i32,
    pub status: SourceStatus,
}

/// Pure transition function for the source health state machine:
/// `active -> failed` on the zero-result threshold (strict sources only),
/// `active -> disabled` on the error threshold. Neither reverses here;
/// recovery is an explicit operator repair.
pub fn apply_outcome(
    source: &JobSource,
    outcome: SourceOutcome,
    policy: &HealthPolicy,
) -> HealthUpdate {
    let mut update = HealthUpdate {
        consecutive_zero_jobs: source.consecutive_zero_jobs,
        consecutive_failures: source.consecutive_failures,
        status: source.status,
    };

    match outcome {
        SourceOutcome::Success(count) => {
            tracing::debug!(source = %source.name, count, "Healthy scrape; counters reset");
            update.consecutive_zero_jobs = 0;
            update.consecutive_failures = 0;
        }
        SourceOutcome::Empty => {
            update.consecutive_zero_jobs = source.consecutive_zero_jobs.saturating_add(1);
            if update.consecutive_zero_jobs >= policy.zero_result_threshold
                && source.validation_policy == ValidationPolicy::Strict
                && source.status == SourceStatus::Active
            {
                update.status = SourceStatus::Failed;
            }
        }
        SourceOutcome::FetchError | SourceOutcome::ExtractionError => {
            update.consecutive_failures = source.consecutive_failures.saturating_add(1);
            if update.consecutive_failures >= policy.failure_threshold
                && source.status == SourceStatus::Active
            {
                update.status = SourceStatus::Disabled;
            }
        }
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::models::source::SourceType;

    fn source(policy: ValidationPolicy) -> JobSource {
        let now = Utc::now();
        JobSource {
            id: 1,
            name: "acme-board".to_string(),
            source_type: SourceType::Api,
            status: SourceStatus::Active,
            config: json!({}),
            company_id: Some(10),
            aggregator_domain: None,
            consecutive_zero_jobs: 0,
            consecutive_failures: 0,
            validation_policy: policy,
            tier: 1,
            last_scraped_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn success_resets_both_counters() {
        let mut s = source(ValidationPolicy::Strict);
        s.consecutive_zero_jobs = 3;
        s.consecutive_failures = 2;
        let update = apply_outcome(&s, SourceOutcome::Success(12), &HealthPolicy::default());
        assert_eq!(update.consecutive_zero_jobs, 0);
        assert_eq!(update.consecutive_failures, 0);
        assert_eq!(update.status, SourceStatus::Active);
    }

    #[test]
    fn strict_source_fails_at_zero_result_threshold() {
        let policy = HealthPolicy::default();
        let mut s = source(ValidationPolicy::Strict);
        for round in 1..=4 {
            let update = apply_outcome(&s, SourceOutcome::Empty, &policy);
            s.consecutive_zero_jobs = update.consecutive_zero_jobs;
            s.status = update.status;
            if round < 4 {
                assert_eq!(s.status, SourceStatus::Active, "failed too early at {round}");
            }
        }
        assert_eq!(s.status, SourceStatus::Failed);
    }

    #[test]
    fn allow_empty_source_never_fails_on_empties() {
        let policy = HealthPolicy::default();
        let mut s = source(ValidationPolicy::AllowEmpty);
        for _ in 0..20 {
            let update = apply_outcome(&s, SourceOutcome::Empty, &policy);
            s.consecutive_zero_jobs = update.consecutive_zero_jobs;
            s.status = update.status;
        }
        assert_eq!(s.status, SourceStatus::Active);
        assert_eq!(s.consecutive_zero_jobs, 20);
    }

    #[test]
    fn third_consecutive_error_disables() {
        let mut s = source(ValidationPolicy::Strict);
        s.consecutive_failures = 2;
        let update = apply_outcome(&s, SourceOutcome::FetchError, &HealthPolicy::default());
        assert_eq!(update.consecutive_failures, 3);
        assert_eq!(update.status, SourceStatus::Disabled);
    }

    #[test]
    fn errors_do_not_touch_the_zero_counter_and_vice_versa() {
        let mut s = source(ValidationPolicy::Strict);
        s.consecutive_zero_jobs = 2;
        let update = apply_outcome(&s, SourceOutcome::ExtractionError, &HealthPolicy::default());
        assert_eq!(update.consecutive_zero_jobs, 2);
        assert_eq!(update.consecutive_failures, 1);

        s.consecutive_failures = 2;
        let update = apply_outcome(&s, SourceOutcome::Empty, &HealthPolicy::default());
        assert_eq!(update.consecutive_failures, 2);
        assert_eq!(update.consecutive_zero_jobs, 3);
    }

    #[test]
    fn disabled_source_never_auto_recovers_via_outcomes() {
        let mut s = source(ValidationPolicy::Strict);
        s.status = SourceStatus::Disabled;
        s.consecutive_failures = 3;
        let update = apply_outcome(&s, SourceOutcome::Success(5), &HealthPolicy::default());
        // counters clear, but status stays until an operator repair
        assert_eq!(update.consecutive_failures, 0);
        assert_eq!(update.status, SourceStatus::Disabled);
    }

    #[test]
    fn scrape_error_maps_to_the_right_outcome() {
        assert_eq!(
            SourceOutcome::from(&ScrapeError::Fetch("timeout".into())),
            SourceOutcome::FetchError
        );
        assert_eq!(
            SourceOutcome::from(&ScrapeError::Extraction("bad selector".into())),
            SourceOutcome::ExtractionError
        );
    }
}
