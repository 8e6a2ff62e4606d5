// Employer attribution. The bug class this module exists to kill: an
// aggregator platform's name or domain leaking into company records, either
// as the employer of a scraped job or as a company's website.

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::company::Company;
use crate::models::source::JobSource;

/// The live set of aggregator platform domains, built from all sources at
/// the start of a run. A company's website must never match any of them.
#[derive(Debug, Clone, Default)]
pub struct AggregatorGuard {
    domains: Vec<String>,
}

impl AggregatorGuard {
    pub fn from_sources(sources: &[JobSource]) -> Self {
        let mut domains: Vec<String> = sources
            .iter()
            .filter_map(|s| s.aggregator_domain.as_deref())
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort();
        domains.dedup();
        Self { domains }
    }

    /// Substring/domain match per the repair-script rules: a candidate
    /// website containing any aggregator domain is rejected.
    pub fn matches(&self, website: &str) -> bool {
        let website = website.trim().to_ascii_lowercase();
        self.domains.iter().any(|d| website.contains(d.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// How to attribute the employer for one raw record, decided before any
/// store access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmployerPlan<'a> {
    /// Company-specific source: the linked company record is authoritative.
    LinkedCompany(i32),
    /// Aggregator source with an employer stated in the record itself.
    FromRecord(&'a str),
    /// Aggregator source, no employer in the record. Never defaulted to the
    /// source's display name; routed to the review queue instead.
    NeedsReview,
}

pub fn plan_employer<'a>(source: &JobSource, raw_company: Option<&'a str>) -> EmployerPlan<'a> {
    if let Some(company_id) = source.company_id {
        return EmployerPlan::LinkedCompany(company_id);
    }
    match raw_company.map(str::trim) {
        Some(name) if !name.is_empty() => EmployerPlan::FromRecord(name),
        _ => EmployerPlan::NeedsReview,
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedEmployer {
    pub company_id: Option<i32>,
    pub company_name: Option<String>,
    pub needs_review: bool,
}

/// Resolve the employer for one record. On company-linked sources the name
/// comes from the company row, never from the record or the source name;
/// on aggregator sources it comes from the record, creating the company
/// (with a null website) on first sight.
pub async fn resolve_employer(
    pool: &PgPool,
    source: &JobSource,
    raw_company: Option<&str>,
) -> Result<ResolvedEmployer, AppError> {
    match plan_employer(source, raw_company) {
        EmployerPlan::LinkedCompany(company_id) => {
            let company = Company::get(pool, company_id).await?;
            Ok(ResolvedEmployer {
                company_id: Some(company.id),
                company_name: Some(company.name),
                needs_review: false,
            })
        }
        EmployerPlan::FromRecord(name) => {
            let company = Company::find_or_create(pool, name).await?;
            Ok(ResolvedEmployer {
                company_id: Some(company.id),
                company_name: Some(company.name),
                needs_review: false,
            })
        }
        EmployerPlan::NeedsReview => {
            tracing::warn!(
                source = %source.name,
                "Aggregator record has no employer field; flagging for review"
            );
            Ok(ResolvedEmployer {
                company_id: None,
                company_name: None,
                needs_review: true,
            })
        }
    }
}

/// Repair pass: null out any persisted company website that matches a live
/// aggregator domain. Returns how many rows were fixed.
pub async fn scrub_aggregator_websites(
    pool: &PgPool,
    guard: &AggregatorGuard,
) -> Result<u64, AppError> {
    if guard.is_empty() {
        return Ok(0);
    }
    let mut fixed = 0;
    for company in Company::list_with_website(pool).await? {
        let Some(website) = company.website.as_deref() else {
            continue;
        };
        if guard.matches(website) {
            tracing::warn!(
                company = %company.name,
                website,
                "Clearing aggregator domain recorded as company website"
            );
            Company::clear_website(pool, company.id).await?;
            fixed += 1;
        }
    }
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::models::source::{SourceStatus, SourceType, ValidationPolicy};

    fn aggregator_source(domain: &str) -> JobSource {
        let now = Utc::now();
        JobSource {
            id: 1,
            name: "Greenhouse boards".to_string(),
            source_type: SourceType::Api,
            status: SourceStatus::Active,
            config: json!({}),
            company_id: None,
            aggregator_domain: Some(domain.to_string()),
            consecutive_zero_jobs: 0,
            consecutive_failures: 0,
            validation_policy: ValidationPolicy::Strict,
            tier: 1,
            last_scraped_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn company_source(company_id: i32) -> JobSource {
        let mut s = aggregator_source("unused");
        s.company_id = Some(company_id);
        s.aggregator_domain = None;
        s.name = "Acme careers".to_string();
        s
    }

    #[test]
    fn aggregator_record_employer_comes_from_the_record() {
        let source = aggregator_source("greenhouse.io");
        assert_eq!(
            plan_employer(&source, Some("Acme")),
            EmployerPlan::FromRecord("Acme")
        );
    }

    #[test]
    fn aggregator_record_without_employer_goes_to_review() {
        let source = aggregator_source("greenhouse.io");
        // never the source's display name
        assert_eq!(plan_employer(&source, None), EmployerPlan::NeedsReview);
        assert_eq!(plan_employer(&source, Some("   ")), EmployerPlan::NeedsReview);
    }

    #[test]
    fn linked_source_ignores_the_record_employer() {
        let source = company_source(42);
        assert_eq!(
            plan_employer(&source, Some("Totally Different Name")),
            EmployerPlan::LinkedCompany(42)
        );
    }

    #[test]
    fn guard_matches_domains_and_subdomains() {
        let guard = AggregatorGuard::from_sources(&[
            aggregator_source("greenhouse.io"),
            aggregator_source("Lever.co "),
        ]);
        assert!(guard.matches("https://boards.greenhouse.io/acme"));
        assert!(guard.matches("greenhouse.io"));
        assert!(guard.matches("https://jobs.lever.co/acme"));
        assert!(!guard.matches("https://acme.com"));
        assert!(!guard.matches("https://acme.io"));
    }

    #[test]
    fn aggregator_hosted_posting_attributes_the_stated_employer() {
        use crate::pipeline::dedup;

        let source = aggregator_source("greenhouse.io");
        let guard = AggregatorGuard::from_sources(std::slice::from_ref(&source));

        // posting hosted on the platform, employer stated in the record
        let plan = plan_employer(&source, Some("Acme"));
        assert_eq!(plan, EmployerPlan::FromRecord("Acme"));

        // identity comes from the normalized posting URL
        let url = dedup::normalize_url("https://boards.greenhouse.io/acme/jobs/55").unwrap();
        assert_eq!(url, "https://boards.greenhouse.io/acme/jobs/55");
        assert!(!dedup::fingerprint(&url).is_empty());

        // the platform domain can never become Acme's website
        assert!(guard.matches("boards.greenhouse.io"));
    }

    #[test]
    fn guard_ignores_company_linked_sources() {
        let guard = AggregatorGuard::from_sources(&[company_source(1)]);
        assert!(guard.is_empty());
        assert!(!guard.matches("https://anything.example"));
    }
}
