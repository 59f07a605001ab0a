#![allow(dead_code)]

use async_trait::async_trait;
use newsbrief::config::Config;
use newsbrief::enrich::{PageFetcher, PageResponse};
use newsbrief::error::{AppError, FetchError};
use newsbrief::llm::Summarizer;
use newsbrief::pipeline::BriefingService;
use newsbrief::search::{RawRecord, SearchProvider, TrendsResult};
use newsbrief::sheets::MemorySheetStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn article(title: &str, link: &str, snippet: &str) -> RawRecord {
    RawRecord {
        title: Some(title.to_string()),
        link: Some(link.to_string()),
        snippet: Some(snippet.to_string()),
        ..Default::default()
    }
}

pub fn query(q: &str, value: serde_json::Value) -> RawRecord {
    RawRecord {
        query: Some(q.to_string()),
        value: Some(value),
        ..Default::default()
    }
}

/// Canned search results; the trends endpoint can be made to rate limit.
#[derive(Default)]
pub struct MockSearch {
    pub news: Vec<RawRecord>,
    pub top_stories: Vec<RawRecord>,
    pub trends: TrendsResult,
    pub trends_rate_limited: u32,
    pub news_error: Option<FetchError>,
    pub news_calls: AtomicU32,
    pub trends_calls: AtomicU32,
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn news(&self) -> Result<Vec<RawRecord>, FetchError> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        // Slow enough that overlapping runs would be visible
        tokio::time::sleep(Duration::from_millis(20)).await;
        match &self.news_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.news.clone()),
        }
    }

    async fn top_stories(&self) -> Result<Vec<RawRecord>, FetchError> {
        Ok(self.top_stories.clone())
    }

    async fn trends(&self) -> Result<TrendsResult, FetchError> {
        let n = self.trends_calls.fetch_add(1, Ordering::SeqCst);
        if n < self.trends_rate_limited {
            Err(FetchError::RateLimited)
        } else {
            Ok(self.trends.clone())
        }
    }
}

/// Page fetcher keyed by URL; unknown URLs are a transport failure.
#[derive(Default)]
pub struct StaticPages {
    pages: HashMap<String, PageResponse>,
}

impl StaticPages {
    pub fn with(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            PageResponse { status, body: body.to_string() },
        );
        self
    }
}

#[async_trait]
impl PageFetcher for StaticPages {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("connection refused: {}", url)))
    }
}

/// Returns numbered summaries, or fails when `fail` is set.
#[derive(Default)]
pub struct MockSummarizer {
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        if self.fail {
            return Err(AppError::SummarizationError("OpenAI returned error status: 500".into()));
        }
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(format!("summary #{}", prompts.len()))
    }
}

pub fn test_config() -> Config {
    Config {
        trends_base_delay: Duration::ZERO,
        trends_max_attempts: 3,
        enrich_concurrency: 4,
        ..Config::default()
    }
}

pub fn meta_page(description: &str) -> String {
    format!(
        "<html><head><meta name=\"description\" content=\"{}\"></head><body></body></html>",
        description
    )
}

pub struct Harness {
    pub service: BriefingService,
    pub search: Arc<MockSearch>,
    pub store: Arc<MemorySheetStore>,
    pub summarizer: Arc<MockSummarizer>,
}

pub fn harness(config: Config, search: MockSearch, summarizer: MockSummarizer, pages: StaticPages) -> Harness {
    let search = Arc::new(search);
    let store = Arc::new(MemorySheetStore::new());
    let summarizer = Arc::new(summarizer);
    let service = BriefingService::new(config, search.clone(), store.clone(), summarizer.clone())
        .with_page_fetcher(Arc::new(pages));
    Harness { service, search, store, summarizer }
}

/// A small but realistic data set: duplicate links, a broken link and two trend lists.
pub fn sample_search() -> MockSearch {
    MockSearch {
        news: vec![
            article("ASX closes higher", "https://news.example/asx", "Miners lead gains"),
            article("ASX closes higher (dup)", "https://news.example/asx", "dup"),
            article("RBA holds", "https://news.example/rba", "Rates steady"),
            article("Paywalled", "https://paywall.example/story", "Bank results beat"),
        ],
        top_stories: vec![article("BHP update", "not-a-url", "Iron ore")],
        trends: TrendsResult {
            rising: vec![
                query("asx 200 today", serde_json::json!("Breakout")),
                query("bhp share price", serde_json::json!("+250%")),
            ],
            top: vec![query("asx", serde_json::json!(100))],
        },
        ..Default::default()
    }
}

pub fn sample_pages() -> StaticPages {
    StaticPages::default()
        .with("https://news.example/asx", 200, &meta_page("The ASX 200 rose 1.2%"))
        .with("https://news.example/rba", 200, "<html><head></head></html>")
        .with("https://paywall.example/story", 403, "")
}
