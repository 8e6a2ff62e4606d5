// Platform adapters: per job-board-platform fetch + extract logic.
// One adapter per fetch style, selected by source_type and the config blob.

mod api_json;
mod html;
mod render;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::models::source::SourceType;

pub use api_json::ApiJsonAdapter;
pub use html::{EmbeddedJsonAdapter, HtmlAdapter};

/// Adapter output before normalization: exactly what the platform said,
/// nothing resolved or canonicalized yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawJobRecord {
    pub title: String,
    pub url: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
}

/// Shared fetch resources handed to every adapter. Adapters are stateless
/// across runs; a failed fetch restarts that source's pagination from page
/// one next time.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub http: reqwest::Client,
    pub render_cmd: Option<String>,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch all pages for one source and extract raw records, in page
    /// order. An empty vec is a well-formed empty result, not an error.
    async fn collect(
        &self,
        ctx: &FetchContext,
        config: &SourceConfig,
    ) -> Result<Vec<RawJobRecord>, ScrapeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Greenhouse,
    Lever,
    Smartrecruiters,
    Workday,
    Icims,
    #[default]
    Generic,
}

/// Declarative per-field extraction map. JSON pointers for API sources,
/// CSS selectors (optionally `css@attr`) for HTML sources.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldMap {
    pub title: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub posted_at: Option<String>,
    pub external_id: Option<String>,
}

fn default_max_pages() -> u32 {
    10
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    /// `?param=N` style, stopping on an empty page.
    PageParam {
        param: String,
        #[serde(default)]
        start: u32,
        #[serde(default = "default_max_pages")]
        max_pages: u32,
    },
    /// POST body `{"limit": .., "offset": ..}` (Workday CXS style).
    Offset {
        #[serde(default = "default_page_size")]
        page_size: u32,
        #[serde(default = "default_max_pages")]
        max_pages: u32,
        /// Extra keys merged into the POST body alongside limit/offset,
        /// for platforms whose endpoint demands them.
        #[serde(default)]
        extra: serde_json::Map<String, serde_json::Value>,
    },
}

/// CSS selector map for HTML list pages. `item` scopes one job card; the
/// per-field selectors run inside it. `selector@attr` pulls an attribute
/// instead of text; `url` defaults to `@href`.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSelectors {
    pub item: String,
    pub title: String,
    pub url: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub posted_at: Option<String>,
}

/// The per-source config blob. Owned by the admin layer, consumed here.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub platform: Platform,
    pub url: String,
    #[serde(default)]
    pub response_path: Option<String>,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub selectors: Option<HtmlSelectors>,
    /// Set on HTML sources that embed their listing data as JSON in a
    /// script tag; switches extraction to the embedded-JSON adapter.
    #[serde(default)]
    pub script_selector: Option<String>,
    #[serde(default)]
    pub requires_js: bool,
    #[serde(default)]
    pub render_wait_for: Option<String>,
    #[serde(default)]
    pub render_timeout_ms: Option<u64>,
}

impl SourceConfig {
    /// Parse the stored JSON blob. A blob that does not deserialize is a
    /// config problem, so it surfaces as an extraction error.
    pub fn from_value(value: &serde_json::Value) -> Result<SourceConfig, ScrapeError> {
        serde_json::from_value(value.clone())
            .map_err(|e| ScrapeError::Extraction(format!("invalid source config: {e}")))
    }
}

/// Select the adapter for a source. Tagged dispatch on source_type plus the
/// embedded-JSON flag; never runtime type inspection of responses.
pub fn adapter_for(source_type: SourceType, config: &SourceConfig) -> Box<dyn PlatformAdapter> {
    match source_type {
        SourceType::Api => Box::new(ApiJsonAdapter),
        SourceType::Html => {
            if config.script_selector.is_some() {
                Box::new(EmbeddedJsonAdapter)
            } else {
                Box::new(HtmlAdapter)
            }
        }
    }
}

/// Best-effort posted-date parsing across the formats the platforms emit:
/// RFC 3339, bare dates, naive datetimes, epoch seconds or milliseconds.
/// Unparseable values (e.g. Workday's "Posted Today") become None.
pub fn parse_posted_at(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_posted_at_str(s),
        serde_json::Value::Number(n) => {
            let n = n.as_i64()?;
            if n > 100_000_000_000 {
                Utc.timestamp_millis_opt(n).single()
            } else {
                Utc.timestamp_opt(n, 0).single()
            }
        }
        _ => None,
    }
}

pub fn parse_posted_at_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_parses_minimal_api_blob() {
        let config = SourceConfig::from_value(&json!({
            "platform": "greenhouse",
            "url": "https://boards-api.greenhouse.io/v1/boards/acme/jobs"
        }))
        .unwrap();
        assert_eq!(config.platform, Platform::Greenhouse);
        assert!(!config.requires_js);
        assert!(config.fields.title.is_none());
    }

    #[test]
    fn config_rejects_blob_without_url() {
        let err = SourceConfig::from_value(&json!({ "platform": "lever" })).unwrap_err();
        assert!(matches!(err, crate::error::ScrapeError::Extraction(_)));
    }

    #[test]
    fn embedded_json_flag_switches_html_dispatch() {
        let html = SourceConfig::from_value(&json!({
            "url": "https://example.com/careers",
            "selectors": { "item": ".job", "title": ".title", "url": "a" }
        }))
        .unwrap();
        assert_eq!(adapter_for(SourceType::Html, &html).name(), "html");

        let embedded = SourceConfig::from_value(&json!({
            "url": "https://example.com/careers",
            "script_selector": "script#jobs-data"
        }))
        .unwrap();
        assert_eq!(
            adapter_for(SourceType::Html, &embedded).name(),
            "embedded_json"
        );
        assert_eq!(adapter_for(SourceType::Api, &embedded).name(), "api_json");
    }

    #[test]
    fn posted_at_handles_platform_date_shapes() {
        assert!(parse_posted_at(&json!("2024-03-01T12:00:00Z")).is_some());
        assert!(parse_posted_at(&json!("2024-03-01")).is_some());
        // Lever emits epoch milliseconds
        let ms = parse_posted_at(&json!(1709294400000i64)).unwrap();
        assert_eq!(ms.timestamp(), 1_709_294_400);
        assert!(parse_posted_at(&json!("Posted Today")).is_none());
        assert!(parse_posted_at(&json!(null)).is_none());
    }
}
