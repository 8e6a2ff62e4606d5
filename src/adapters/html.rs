use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::adapters::render::render_page;
use crate::adapters::{
    FetchContext, HtmlSelectors, PlatformAdapter, RawJobRecord, SourceConfig, api_json,
    parse_posted_at_str,
};
use crate::error::ScrapeError;

const DEFAULT_RENDER_TIMEOUT_MS: u64 = 15_000;

/// CSS-selector adapter for custom careers pages. Sources that need a
/// browser set `requires_js` and go through the external render command;
/// everything else is a plain GET.
pub struct HtmlAdapter;

#[async_trait]
impl PlatformAdapter for HtmlAdapter {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn collect(
        &self,
        ctx: &FetchContext,
        config: &SourceConfig,
    ) -> Result<Vec<RawJobRecord>, ScrapeError> {
        let selectors = config.selectors.as_ref().ok_or_else(|| {
            ScrapeError::Extraction("html source config has no selectors".to_string())
        })?;
        let base = Url::parse(&config.url)
            .map_err(|e| ScrapeError::Extraction(format!("invalid source url: {e}")))?;
        let body = fetch_html(ctx, config).await?;
        extract_html_records(&body, selectors, &base)
    }
}

/// HTML sources whose listing data lives as JSON inside a script tag
/// (Next.js data blobs, JSON-LD). Extraction reuses the JSON field map
/// once the blob is pulled out of the document.
pub struct EmbeddedJsonAdapter;

#[async_trait]
impl PlatformAdapter for EmbeddedJsonAdapter {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    async fn collect(
        &self,
        ctx: &FetchContext,
        config: &SourceConfig,
    ) -> Result<Vec<RawJobRecord>, ScrapeError> {
        let script_selector = config.script_selector.as_deref().ok_or_else(|| {
            ScrapeError::Extraction("embedded-json source config has no script_selector".to_string())
        })?;
        let base = Url::parse(&config.url)
            .map_err(|e| ScrapeError::Extraction(format!("invalid source url: {e}")))?;
        let body = fetch_html(ctx, config).await?;
        let blob = extract_script_json(&body, script_selector)?;
        api_json::extract_records(&blob, config.response_path.as_deref(), &config.fields, &base)
    }
}

async fn fetch_html(ctx: &FetchContext, config: &SourceConfig) -> Result<String, ScrapeError> {
    if config.requires_js {
        let render_cmd = ctx.render_cmd.as_deref().ok_or_else(|| {
            ScrapeError::Fetch("source requires_js but no render command is configured".to_string())
        })?;
        return render_page(
            render_cmd,
            &config.url,
            config.render_wait_for.as_deref(),
            config.render_timeout_ms.unwrap_or(DEFAULT_RENDER_TIMEOUT_MS),
        )
        .await;
    }

    let resp = ctx
        .http
        .get(&config.url)
        .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
        .send()
        .await
        .map_err(ScrapeError::fetch)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ScrapeError::Fetch(format!("{} returned {status}", config.url)));
    }
    resp.text().await.map_err(ScrapeError::fetch)
}

/// Apply the selector map to a listing page. Zero matched items is an
/// empty result; a selector that will not even parse is a config problem.
pub(crate) fn extract_html_records(
    body: &str,
    selectors: &HtmlSelectors,
    base: &Url,
) -> Result<Vec<RawJobRecord>, ScrapeError> {
    let document = Html::parse_document(body);
    let item_sel = parse_selector(&selectors.item)?;

    let items: Vec<ElementRef> = document.select(&item_sel).collect();
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for item in &items {
        let title = select_field(item, &selectors.title, None)?;
        let url = select_field(item, &selectors.url, Some("href"))?;
        let (Some(title), Some(raw_url)) = (title, url) else {
            tracing::debug!("Skipping job card missing title/url");
            continue;
        };
        let Ok(url) = base.join(&raw_url) else {
            tracing::debug!("Skipping job card with unjoinable url {raw_url}");
            continue;
        };
        records.push(RawJobRecord {
            title,
            url: url.to_string(),
            location: opt_field(item, selectors.location.as_deref())?,
            description: opt_field(item, selectors.description.as_deref())?,
            company: opt_field(item, selectors.company.as_deref())?,
            posted_at: opt_field(item, selectors.posted_at.as_deref())?
                .and_then(|s| parse_posted_at_str(&s)),
            external_id: None,
        });
    }
    if records.is_empty() {
        return Err(ScrapeError::Extraction(
            "item selector matched cards but title/url selectors matched nothing".to_string(),
        ));
    }
    Ok(records)
}

fn extract_script_json(body: &str, script_selector: &str) -> Result<serde_json::Value, ScrapeError> {
    let document = Html::parse_document(body);
    let sel = parse_selector(script_selector)?;
    let script = document.select(&sel).next().ok_or_else(|| {
        ScrapeError::Extraction(format!("script selector '{script_selector}' matched nothing"))
    })?;
    let text: String = script.text().collect();
    serde_json::from_str(text.trim())
        .map_err(|e| ScrapeError::Extraction(format!("embedded script is not valid JSON: {e}")))
}

/// Selectors may carry an attribute suffix: `a.apply@href`.
fn split_attr(selector: &str) -> (&str, Option<&str>) {
    match selector.rsplit_once('@') {
        Some((css, attr)) if !css.is_empty() => (css, Some(attr)),
        _ => (selector, None),
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Extraction(format!("invalid selector '{selector}': {e}")))
}

fn select_field(
    item: &ElementRef,
    selector: &str,
    default_attr: Option<&str>,
) -> Result<Option<String>, ScrapeError> {
    let (css, attr) = split_attr(selector);
    let sel = parse_selector(css)?;
    let Some(node) = item.select(&sel).next() else {
        return Ok(None);
    };
    // A named attribute that is absent is a miss, never a text fallback;
    // an anchor without href must not yield its link text as a URL.
    let value = match attr.or(default_attr) {
        Some(attr) => match node.value().attr(attr) {
            Some(v) => v.to_string(),
            None => return Ok(None),
        },
        None => node.text().collect::<String>(),
    };
    let trimmed = value.trim().to_string();
    Ok(if trimmed.is_empty() { None } else { Some(trimmed) })
}

fn opt_field(item: &ElementRef, selector: Option<&str>) -> Result<Option<String>, ScrapeError> {
    match selector {
        Some(s) => select_field(item, s, None),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FieldMap;

    fn selectors() -> HtmlSelectors {
        HtmlSelectors {
            item: ".job-card".to_string(),
            title: ".job-title".to_string(),
            url: "a.apply".to_string(),
            location: Some(".job-location".to_string()),
            description: None,
            company: Some(".job-company".to_string()),
            posted_at: None,
        }
    }

    fn base() -> Url {
        Url::parse("https://careers.example.com/openings").unwrap()
    }

    #[test]
    fn extracts_cards_and_joins_relative_urls() {
        let body = r#"
            <div class="job-card">
                <h3 class="job-title">Rust Engineer</h3>
                <span class="job-location">Remote</span>
                <a class="apply" href="/jobs/101">Apply</a>
            </div>
            <div class="job-card">
                <h3 class="job-title">Go Engineer</h3>
                <a class="apply" href="https://careers.example.com/jobs/102">Apply</a>
            </div>
        "#;
        let records = extract_html_records(body, &selectors(), &base()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Rust Engineer");
        assert_eq!(records[0].url, "https://careers.example.com/jobs/101");
        assert_eq!(records[0].location.as_deref(), Some("Remote"));
        assert_eq!(records[1].url, "https://careers.example.com/jobs/102");
    }

    #[test]
    fn attr_suffix_pulls_attributes() {
        let mut sels = selectors();
        sels.url = "a.apply@data-url".to_string();
        let body = r#"
            <div class="job-card">
                <h3 class="job-title">Rust Engineer</h3>
                <a class="apply" data-url="/jobs/7" href="/ignored">Apply</a>
            </div>
        "#;
        let records = extract_html_records(body, &sels, &base()).unwrap();
        assert_eq!(records[0].url, "https://careers.example.com/jobs/7");
    }

    #[test]
    fn anchor_without_href_is_skipped_not_link_text() {
        let body = r#"
            <div class="job-card">
                <h3 class="job-title">Rust Engineer</h3>
                <a class="apply">Apply now</a>
            </div>
            <div class="job-card">
                <h3 class="job-title">Go Engineer</h3>
                <a class="apply" href="/jobs/102">Apply</a>
            </div>
        "#;
        let records = extract_html_records(body, &selectors(), &base()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://careers.example.com/jobs/102");
    }

    #[test]
    fn all_anchors_without_href_is_extraction_error() {
        let body = r#"
            <div class="job-card">
                <h3 class="job-title">Rust Engineer</h3>
                <a class="apply">Apply now</a>
            </div>
            <div class="job-card">
                <h3 class="job-title">Go Engineer</h3>
                <a class="apply">Apply now</a>
            </div>
        "#;
        let err = extract_html_records(body, &selectors(), &base()).unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[test]
    fn zero_cards_is_empty_result() {
        let body = "<html><body><p>No openings right now.</p></body></html>";
        let records = extract_html_records(body, &selectors(), &base()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn cards_without_fields_is_extraction_error() {
        let body = r#"<div class="job-card"><p>redesigned markup</p></div>"#;
        let err = extract_html_records(body, &selectors(), &base()).unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[test]
    fn invalid_selector_is_extraction_error() {
        let mut sels = selectors();
        sels.item = ":::".to_string();
        let err = extract_html_records("<html></html>", &sels, &base()).unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[test]
    fn embedded_script_blob_feeds_json_field_map() {
        let body = r#"
            <html><head>
            <script id="jobs-data" type="application/json">
                { "openings": [
                    { "title": "Staff Engineer", "url": "https://x.com/jobs/1" }
                ] }
            </script>
            </head></html>
        "#;
        let blob = extract_script_json(body, "script#jobs-data").unwrap();
        let fields = FieldMap {
            title: Some("/title".to_string()),
            url: Some("/url".to_string()),
            ..FieldMap::default()
        };
        let records =
            api_json::extract_records(&blob, Some("/openings"), &fields, &base()).unwrap();
        assert_eq!(records[0].title, "Staff Engineer");
    }

    #[test]
    fn missing_script_tag_is_extraction_error() {
        let err = extract_script_json("<html></html>", "script#jobs-data").unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }
}
