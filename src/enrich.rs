//! Meta-description enrichment of news links, with bounded concurrency.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{header, Client};
use select::document::Document;
use select::predicate::{And, Attr, Name};
use std::fmt;
use std::time::Duration as StdDuration;
use url::Url;

use crate::error::FetchError;
use crate::rows::NewsRow;

// Browser-like headers; many publishers answer 403 to library user agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Result of looking up one page's meta description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaDescription {
    Found(String),
    InvalidUrl,
    Http(u16),
    Missing,
    FetchFailed,
}

impl MetaDescription {
    /// Only HTTP and transport failures are replaced by the API snippet.
    pub fn falls_back_to_snippet(&self) -> bool {
        matches!(self, MetaDescription::Http(_) | MetaDescription::FetchFailed)
    }
}

impl fmt::Display for MetaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaDescription::Found(text) => write!(f, "{}", text),
            MetaDescription::InvalidUrl => write!(f, "Invalid URL"),
            MetaDescription::Http(status) => write!(f, "HTTP {}", status),
            MetaDescription::Missing => write!(f, "No Meta Description"),
            MetaDescription::FetchFailed => write!(f, "Error Fetching Description"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// Fetches a page body. Implementations should follow redirects and apply their own timeout.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError>;
}

/// reqwest-backed fetcher. One instance is one HTTP session; drop it to release the pool.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: StdDuration) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
        );
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Ok(PageResponse { status, body: String::new() });
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(PageResponse { status, body })
    }
}

/// Absolute http(s) URL check; anything else is never fetched.
pub fn is_fetchable(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// First `<meta name="description">` content, trimmed; `None` if absent or blank.
pub fn extract_meta_description(html: &str) -> Option<String> {
    let document = Document::from(html);
    let tag = document
        .find(And(Name("meta"), Attr("name", "description")))
        .next()?;
    let content = tag.attr("content")?.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[tracing::instrument(skip(fetcher, url), fields(url = %url))]
pub async fn describe(fetcher: &dyn PageFetcher, url: &str) -> MetaDescription {
    if url.is_empty() || !is_fetchable(url) {
        return MetaDescription::InvalidUrl;
    }
    match fetcher.get(url).await {
        Ok(page) if page.status != 200 => {
            tracing::debug!("HTTP {} fetching description", page.status);
            MetaDescription::Http(page.status)
        }
        Ok(page) => match extract_meta_description(&page.body) {
            Some(text) => MetaDescription::Found(text),
            None => MetaDescription::Missing,
        },
        Err(e) => {
            tracing::debug!("Description fetch failed: {}", e);
            MetaDescription::FetchFailed
        }
    }
}

/// Describe every URL with at most `limit` requests in flight. The output has
/// the same length and order as `urls`, whatever order the fetches finish in.
pub async fn fetch_meta_descriptions(
    fetcher: &dyn PageFetcher,
    urls: &[String],
    limit: usize,
) -> Vec<MetaDescription> {
    // Collected first so the stream is Send; `buffered` still polls at most `limit` of them.
    let lookups: Vec<_> = urls.iter().map(|url| describe(fetcher, url)).collect();
    stream::iter(lookups).buffered(limit.max(1)).collect().await
}

/// Fill in `description` for each row, falling back to the snippet where the
/// fetch failed at the HTTP or transport level.
pub async fn enrich_rows(fetcher: &dyn PageFetcher, rows: &mut [NewsRow], limit: usize) {
    let urls: Vec<String> = rows.iter().map(|r| r.link.clone()).collect();
    let descriptions = fetch_meta_descriptions(fetcher, &urls, limit).await;

    let mut fallbacks = 0;
    for (row, meta) in rows.iter_mut().zip(descriptions) {
        row.description = if meta.falls_back_to_snippet() {
            fallbacks += 1;
            row.snippet.clone()
        } else {
            meta.to_string()
        };
    }
    tracing::info!("Enriched {} rows ({} fell back to snippet)", rows.len(), fallbacks);
}
