// Deduplication & normalization: stable URL-derived identity plus a
// content hash for duplicate-vs-updated decisions. Identity is strictly
// URL-based; semantic cross-board dedup is deliberately out of scope.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::ScrapeError;
use crate::models::listing::JobListing;

/// Query parameters that never change listing identity.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref"];

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Canonicalize a posting URL: https scheme, lower-case host, no default
/// port, no fragment, no tracking parameters, no trailing slash. Two
/// listings with equal normalized URLs are the same listing.
pub fn normalize_url(raw: &str) -> Result<String, ScrapeError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ScrapeError::Extraction(format!("unparseable posting url '{raw}': {e}")))?;
    match url.scheme() {
        "https" => {}
        "http" => {
            let _ = url.set_scheme("https");
        }
        other => {
            return Err(ScrapeError::Extraction(format!(
                "unsupported posting url scheme '{other}'"
            )));
        }
    }
    if !url.has_host() {
        return Err(ScrapeError::Extraction(format!("posting url '{raw}' has no host")));
    }
    if matches!(url.port(), Some(80) | Some(443)) {
        let _ = url.set_port(None);
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Ok(url.to_string())
}

pub fn fingerprint(normalized_url: &str) -> String {
    hex::encode(Sha256::digest(normalized_url.as_bytes()))
}

/// Secondary hash over the fields whose change makes a listing "updated"
/// rather than a plain duplicate.
pub fn content_hash(title: &str, description: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update([0x1f]);
    hasher.update(description.unwrap_or("").trim().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    New,
    Updated { id: i32 },
    Duplicate { id: i32 },
}

/// Compare a candidate's content hash against the persisted listing with
/// the same fingerprint, if any.
pub fn reconcile(candidate_content_hash: &str, existing: Option<&JobListing>) -> Decision {
    match existing {
        None => Decision::New,
        Some(listing) if listing.content_hash == candidate_content_hash => {
            Decision::Duplicate { id: listing.id }
        }
        Some(listing) => Decision::Updated { id: listing.id },
    }
}

/// In-memory fingerprint set for one run. Suppresses duplicates within and
/// across sources in the same cycle without a store lookup per record;
/// sources that repeat jobs across their own pages hit this too.
#[derive(Debug, Default)]
pub struct RunDedup {
    seen: HashSet<String>,
}

impl RunDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time a fingerprint is offered this run.
    pub fn first_sighting(&mut self, fingerprint: &str) -> bool {
        self.seen.insert(fingerprint.to_string())
    }
}
