use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use crate::adapters::{
    FetchContext, FieldMap, Pagination, Platform, PlatformAdapter, RawJobRecord, SourceConfig,
    parse_posted_at,
};
use crate::error::ScrapeError;

/// JSON-API adapter covering the hosted ATS platforms plus fully
/// declarative generic endpoints. Known platforms carry preset response
/// paths and field pointers; anything set in the source config wins.
pub struct ApiJsonAdapter;

#[async_trait]
impl PlatformAdapter for ApiJsonAdapter {
    fn name(&self) -> &'static str {
        "api_json"
    }

    async fn collect(
        &self,
        ctx: &FetchContext,
        config: &SourceConfig,
    ) -> Result<Vec<RawJobRecord>, ScrapeError> {
        let preset = preset_for(config.platform);
        let fields = preset.fields.overridden_by(&config.fields);
        let response_path = config
            .response_path
            .as_deref()
            .or(preset.response_path)
            .map(str::to_string);
        let base = Url::parse(&config.url)
            .map_err(|e| ScrapeError::Extraction(format!("invalid source url: {e}")))?;
        let pagination = config.pagination.clone().or(preset.pagination);

        let mut records = Vec::new();
        match pagination {
            None => {
                let body = fetch_page(ctx, &config.url, preset.method, None).await?;
                records = extract_records(&body, response_path.as_deref(), &fields, &base)?;
            }
            Some(Pagination::PageParam { param, start, max_pages }) => {
                for page in start..start.saturating_add(max_pages) {
                    let mut url = base.clone();
                    url.query_pairs_mut().append_pair(&param, &page.to_string());
                    let body = fetch_page(ctx, url.as_str(), preset.method, None).await?;
                    let page_records =
                        extract_records(&body, response_path.as_deref(), &fields, &base)?;
                    if page_records.is_empty() {
                        break;
                    }
                    records.extend(page_records);
                }
            }
            Some(Pagination::Offset { page_size, max_pages, extra }) => {
                for page in 0..max_pages {
                    let payload = offset_payload(page_size, page * page_size, &extra);
                    let body =
                        fetch_page(ctx, &config.url, preset.method, Some(&payload)).await?;
                    let page_records =
                        extract_records(&body, response_path.as_deref(), &fields, &base)?;
                    let len = page_records.len() as u32;
                    records.extend(page_records);
                    if len < page_size {
                        break;
                    }
                }
            }
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMethod {
    Get,
    PostJson,
}

struct Preset {
    response_path: Option<&'static str>,
    fields: FieldMap,
    pagination: Option<Pagination>,
    method: FetchMethod,
}

fn map(
    title: &str,
    url: &str,
    location: Option<&str>,
    description: Option<&str>,
    company: Option<&str>,
    posted_at: Option<&str>,
    external_id: Option<&str>,
) -> FieldMap {
    FieldMap {
        title: Some(title.to_string()),
        url: Some(url.to_string()),
        location: location.map(str::to_string),
        description: description.map(str::to_string),
        company: company.map(str::to_string),
        posted_at: posted_at.map(str::to_string),
        external_id: external_id.map(str::to_string),
    }
}

fn preset_for(platform: Platform) -> Preset {
    match platform {
        Platform::Greenhouse => Preset {
            response_path: Some("/jobs"),
            fields: map(
                "/title",
                "/absolute_url",
                Some("/location/name"),
                Some("/content"),
                Some("/company_name"),
                Some("/updated_at"),
                Some("/id"),
            ),
            pagination: None,
            method: FetchMethod::Get,
        },
        Platform::Lever => Preset {
            response_path: None,
            fields: map(
                "/text",
                "/hostedUrl",
                Some("/categories/location"),
                Some("/descriptionPlain"),
                None,
                Some("/createdAt"),
                Some("/id"),
            ),
            pagination: None,
            method: FetchMethod::Get,
        },
        Platform::Smartrecruiters => Preset {
            response_path: Some("/content"),
            fields: map(
                "/name",
                "/ref",
                Some("/location/city"),
                None,
                Some("/company/name"),
                Some("/releasedDate"),
                Some("/id"),
            ),
            pagination: None,
            method: FetchMethod::Get,
        },
        Platform::Workday => Preset {
            response_path: Some("/jobPostings"),
            fields: map(
                "/title",
                "/externalPath",
                Some("/locationsText"),
                None,
                None,
                Some("/postedOn"),
                Some("/bulletFields/0"),
            ),
            pagination: Some(Pagination::Offset {
                page_size: 20,
                max_pages: 10,
                // the CXS endpoint 400s without a searchText key
                extra: [("searchText".to_string(), json!(""))].into_iter().collect(),
            }),
            method: FetchMethod::PostJson,
        },
        Platform::Icims => Preset {
            response_path: Some("/jobs"),
            fields: map(
                "/title",
                "/url",
                Some("/location"),
                Some("/description"),
                None,
                Some("/postedDate"),
                Some("/id"),
            ),
            pagination: None,
            method: FetchMethod::Get,
        },
        Platform::Generic => Preset {
            response_path: None,
            fields: map("/title", "/url", None, None, None, None, None),
            pagination: None,
            method: FetchMethod::Get,
        },
    }
}

impl FieldMap {
    fn overridden_by(&self, other: &FieldMap) -> FieldMap {
        FieldMap {
            title: other.title.clone().or_else(|| self.title.clone()),
            url: other.url.clone().or_else(|| self.url.clone()),
            location: other.location.clone().or_else(|| self.location.clone()),
            description: other.description.clone().or_else(|| self.description.clone()),
            company: other.company.clone().or_else(|| self.company.clone()),
            posted_at: other.posted_at.clone().or_else(|| self.posted_at.clone()),
            external_id: other.external_id.clone().or_else(|| self.external_id.clone()),
        }
    }
}

/// Build one offset-pagination POST body: platform extras first, then
/// limit/offset on top.
fn offset_payload(
    page_size: u32,
    offset: u32,
    extra: &serde_json::Map<String, Value>,
) -> Value {
    let mut payload = extra.clone();
    payload.insert("limit".to_string(), json!(page_size));
    payload.insert("offset".to_string(), json!(offset));
    Value::Object(payload)
}

async fn fetch_page(
    ctx: &FetchContext,
    url: &str,
    method: FetchMethod,
    payload: Option<&Value>,
) -> Result<Value, ScrapeError> {
    let request = match method {
        FetchMethod::Get => ctx.http.get(url),
        FetchMethod::PostJson => ctx.http.post(url).json(payload.unwrap_or(&Value::Null)),
    };
    let resp = request
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(ScrapeError::fetch)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ScrapeError::Fetch(format!("{url} returned {status}")));
    }
    resp.json()
        .await
        .map_err(|e| ScrapeError::Extraction(format!("response is not JSON: {e}")))
}

/// Apply the field map to one page of response JSON. A missing response
/// path or a non-array at it means the config no longer matches the
/// platform; an empty array is a legitimate empty result.
pub(crate) fn extract_records(
    body: &Value,
    response_path: Option<&str>,
    fields: &FieldMap,
    base: &Url,
) -> Result<Vec<RawJobRecord>, ScrapeError> {
    let items = match response_path {
        Some(path) => body.pointer(path).ok_or_else(|| {
            ScrapeError::Extraction(format!("response path '{path}' not found"))
        })?,
        None => body,
    };
    let items = items
        .as_array()
        .ok_or_else(|| ScrapeError::Extraction("expected a JSON array of jobs".to_string()))?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for item in items {
        if let Some(record) = record_from_item(item, fields, base) {
            records.push(record);
        } else {
            tracing::debug!("Skipping record missing title/url");
        }
    }
    if records.is_empty() {
        return Err(ScrapeError::Extraction(
            "field map matched no records in a non-empty response".to_string(),
        ));
    }
    Ok(records)
}

fn record_from_item(item: &Value, fields: &FieldMap, base: &Url) -> Option<RawJobRecord> {
    let title = pointer_string(item, fields.title.as_deref()?)?;
    let raw_url = pointer_string(item, fields.url.as_deref()?)?;
    // Workday-style relative paths join against the source origin
    let url = base.join(&raw_url).ok()?.to_string();

    Some(RawJobRecord {
        title,
        url,
        location: fields
            .location
            .as_deref()
            .and_then(|p| pointer_string(item, p)),
        description: fields
            .description
            .as_deref()
            .and_then(|p| pointer_string(item, p)),
        company: fields
            .company
            .as_deref()
            .and_then(|p| pointer_string(item, p)),
        posted_at: fields
            .posted_at
            .as_deref()
            .and_then(|p| item.pointer(p))
            .and_then(parse_posted_at),
        external_id: fields
            .external_id
            .as_deref()
            .and_then(|p| pointer_string(item, p)),
    })
}

fn pointer_string(item: &Value, pointer: &str) -> Option<String> {
    match item.pointer(pointer)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
