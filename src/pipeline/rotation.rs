// Rotation: pick which sources a run scrapes. Staleness-first with tier as
// the tie-break, deterministic on full ties via insertion order.

use std::collections::HashSet;

use crate::models::source::{JobSource, SourceStatus};

#[derive(Debug, Clone, Default)]
pub struct SelectionConfig {
    pub max_sources: usize,
    /// Operator override: exactly these sources, in this order, bypassing
    /// rotation. Deleted sources are never selectable.
    pub source_ids: Option<Vec<i32>>,
}

/// Select the sources for one run from the full (insertion-ordered,
/// non-deleted) source list. Never returns the same source twice.
pub fn select_sources(sources: &[JobSource], config: &SelectionConfig) -> Vec<JobSource> {
    if let Some(ids) = &config.source_ids {
        let mut picked = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(source) = sources
                .iter()
                .find(|s| s.id == *id && s.status != SourceStatus::Deleted)
            {
                picked.push(source.clone());
            } else {
                tracing::warn!("Requested source {id} not found or deleted; skipping");
            }
        }
        return picked;
    }

    let mut candidates: Vec<&JobSource> = sources
        .iter()
        .filter(|s| s.status == SourceStatus::Active)
        .collect();
    // Stable sort: never-scraped first, then oldest scrape, higher tier
    // ahead on equal staleness; insertion order decides full ties.
    candidates.sort_by(|a, b| {
        match (a.last_scraped_at, b.last_scraped_at) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        }
        .then_with(|| b.tier.cmp(&a.tier))
    });
    candidates
        .into_iter()
        .take(config.max_sources)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use crate::models::source::{SourceType, ValidationPolicy};

    fn source(id: i32, status: SourceStatus) -> JobSource {
        let now = Utc::now();
        JobSource {
            id,
            name: format!("source-{id}"),
            source_type: SourceType::Api,
            status,
            config: json!({}),
            company_id: Some(1),
            aggregator_domain: None,
            consecutive_zero_jobs: 0,
            consecutive_failures: 0,
            validation_policy: ValidationPolicy::Strict,
            tier: 1,
            last_scraped_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ids(selected: &[JobSource]) -> Vec<i32> {
        selected.iter().map(|s| s.id).collect()
    }

    #[test]
    fn only_active_sources_rotate() {
        let sources = vec![
            source(1, SourceStatus::Active),
            source(2, SourceStatus::Disabled),
            source(3, SourceStatus::Failed),
            source(4, SourceStatus::Active),
        ];
        let config = SelectionConfig { max_sources: 10, source_ids: None };
        assert_eq!(ids(&select_sources(&sources, &config)), vec![1, 4]);
    }

    #[test]
    fn stalest_sources_go_first_then_tier() {
        let now = Utc::now();
        let mut s1 = source(1, SourceStatus::Active);
        s1.last_scraped_at = Some(now - Duration::hours(1));
        let mut s2 = source(2, SourceStatus::Active);
        s2.last_scraped_at = Some(now - Duration::hours(5));
        let mut s3 = source(3, SourceStatus::Active);
        s3.last_scraped_at = Some(now - Duration::hours(5));
        s3.tier = 3;
        let s4 = source(4, SourceStatus::Active); // never scraped

        let config = SelectionConfig { max_sources: 10, source_ids: None };
        assert_eq!(ids(&select_sources(&[s1, s2, s3, s4], &config)), vec![4, 3, 2, 1]);
    }

    #[test]
    fn never_scraped_ties_break_by_insertion_order() {
        let sources = vec![
            source(5, SourceStatus::Active),
            source(2, SourceStatus::Active),
            source(9, SourceStatus::Active),
        ];
        let config = SelectionConfig { max_sources: 2, source_ids: None };
        assert_eq!(ids(&select_sources(&sources, &config)), vec![5, 2]);
    }

    #[test]
    fn consecutive_runs_cover_disjoint_halves() {
        let now = Utc::now();
        let mut sources: Vec<JobSource> = (1..=6).map(|id| source(id, SourceStatus::Active)).collect();
        let config = SelectionConfig { max_sources: 3, source_ids: None };

        let first = select_sources(&sources, &config);
        assert_eq!(ids(&first), vec![1, 2, 3]);
        for picked in &first {
            let s = sources.iter_mut().find(|s| s.id == picked.id).unwrap();
            s.last_scraped_at = Some(now);
        }

        let second = select_sources(&sources, &config);
        assert_eq!(ids(&second), vec![4, 5, 6]);
    }

    #[test]
    fn explicit_ids_bypass_rotation_but_not_deletion() {
        let sources = vec![
            source(1, SourceStatus::Active),
            source(2, SourceStatus::Disabled),
            source(3, SourceStatus::Deleted),
        ];
        let config = SelectionConfig {
            max_sources: 1,
            source_ids: Some(vec![2, 3, 1, 2]),
        };
        // disabled source is reachable for repair verification, the deleted
        // one is not, and the repeat is dropped
        assert_eq!(ids(&select_sources(&sources, &config)), vec![2, 1]);
    }

    #[test]
    fn max_sources_bounds_the_batch() {
        let sources: Vec<JobSource> = (1..=10).map(|id| source(id, SourceStatus::Active)).collect();
        let config = SelectionConfig { max_sources: 4, source_ids: None };
        assert_eq!(select_sources(&sources, &config).len(), 4);
    }
}
