//! One briefing run: retrieve, normalize, enrich, store, summarize. Plus the
//! cooldown-gated entry point shared by the web handler and the worker.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::enrich::{enrich_rows, HttpPageFetcher, PageFetcher};
use crate::error::AppError;
use crate::gate::{self, GateState, RunMetadata};
use crate::llm::Summarizer;
use crate::retry::{fetch_trends_with_backoff, RetryPolicy};
use crate::rows::{normalize_news, normalize_trends, NewsRow, TrendRow, NEWS_HEADER, TREND_HEADER};
use crate::search::SearchProvider;
use crate::sheets::{
    write_sheet, SheetStore, ValueInput, GOOGLE_NEWS_SHEET, TOP_STORIES_SHEET, TRENDS_RISING_SHEET, TRENDS_TOP_SHEET,
};
use crate::summary::generate_summary;

/// Row counts written by a retrieval run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalStats {
    pub news: usize,
    pub top_stories: usize,
    pub trends_rising: usize,
    pub trends_top: usize,
}

/// What a gated request got back.
#[derive(Debug, Clone, PartialEq)]
pub enum BriefingOutcome {
    /// Still inside the cooldown window; the stored summary is returned as is.
    Cached {
        summary: String,
        remaining_hours: f64,
        last_run: DateTime<Utc>,
    },
    /// The pipeline ran and the metadata was updated.
    Fresh { summary: String, last_run: DateTime<Utc> },
}

impl BriefingOutcome {
    pub fn summary(&self) -> &str {
        match self {
            BriefingOutcome::Cached { summary, .. } | BriefingOutcome::Fresh { summary, .. } => summary,
        }
    }
}

pub struct BriefingService {
    config: Config,
    search: Arc<dyn SearchProvider>,
    store: Arc<dyn SheetStore>,
    summarizer: Arc<dyn Summarizer>,
    /// Overrides the per-run HTTP session; tests inject a scripted fetcher here.
    page_fetcher: Option<Arc<dyn PageFetcher>>,
    run_lock: Mutex<()>,
}

impl BriefingService {
    pub fn new(
        config: Config,
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn SheetStore>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            config,
            search,
            store,
            summarizer,
            page_fetcher: None,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_page_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.page_fetcher = Some(fetcher);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn SheetStore {
        self.store.as_ref()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.trends_max_attempts,
            base_delay: self.config.trends_base_delay,
        }
    }

    /// A fresh session per run, dropped when the run ends.
    fn page_session(&self) -> Result<Arc<dyn PageFetcher>, AppError> {
        match &self.page_fetcher {
            Some(fetcher) => Ok(fetcher.clone()),
            None => {
                let fetcher = HttpPageFetcher::new(self.config.enrich_timeout)
                    .map_err(|e| AppError::InternalError(format!("building HTTP client: {}", e)))?;
                Ok(Arc::new(fetcher))
            }
        }
    }

    /// Fetch all three sources, enrich the news links and overwrite the four data sheets.
    #[tracing::instrument(skip(self))]
    pub async fn retrieve_and_store(&self) -> Result<RetrievalStats, AppError> {
        let search = self.search.as_ref();

        tracing::info!("Fetching Google News results...");
        let news_raw = search.news().await?;
        tracing::info!("Fetching top stories...");
        let top_raw = search.top_stories().await?;
        tracing::info!("Fetching Google Trends related queries...");
        let trends = fetch_trends_with_backoff(search, self.retry_policy()).await?;

        let mut news = normalize_news(&news_raw, self.config.cap_news);
        let mut top_stories = normalize_news(&top_raw, self.config.cap_top_stories);
        let rising = normalize_trends(&trends.rising, self.config.cap_trends);
        let top_trends = normalize_trends(&trends.top, self.config.cap_trends);

        {
            let session = self.page_session()?;
            let limit = self.config.enrich_concurrency;
            enrich_rows(session.as_ref(), &mut news, limit).await;
            enrich_rows(session.as_ref(), &mut top_stories, limit).await;
        }

        let stats = RetrievalStats {
            news: news.len(),
            top_stories: top_stories.len(),
            trends_rising: rising.len(),
            trends_top: top_trends.len(),
        };

        let store = self.store.as_ref();
        let input = ValueInput::UserEntered;
        write_sheet(
            store,
            GOOGLE_NEWS_SHEET,
            &NEWS_HEADER,
            news.into_iter().map(NewsRow::into_cells).collect(),
            input,
        )
        .await?;
        write_sheet(
            store,
            TOP_STORIES_SHEET,
            &NEWS_HEADER,
            top_stories.into_iter().map(NewsRow::into_cells).collect(),
            input,
        )
        .await?;
        write_sheet(
            store,
            TRENDS_RISING_SHEET,
            &TREND_HEADER,
            rising.into_iter().map(TrendRow::into_cells).collect(),
            input,
        )
        .await?;
        write_sheet(
            store,
            TRENDS_TOP_SHEET,
            &TREND_HEADER,
            top_trends.into_iter().map(TrendRow::into_cells).collect(),
            input,
        )
        .await?;

        tracing::info!(?stats, "Retrieval finished");
        Ok(stats)
    }

    /// Summarize whatever the data sheets currently hold.
    pub async fn summarize(&self) -> Result<String, AppError> {
        generate_summary(
            self.store.as_ref(),
            self.summarizer.as_ref(),
            Utc::now(),
            self.config.display_timezone,
        )
        .await
    }

    /// Retrieval followed by summarization. Any failure aborts the run.
    pub async fn run_pipeline(&self) -> Result<String, AppError> {
        self.retrieve_and_store().await?;
        self.summarize().await
    }

    /// Serve the cached summary while cooling, otherwise run the pipeline and
    /// record it. Metadata is only written after the whole run succeeded.
    /// Runs within this process are serialized.
    #[tracing::instrument(skip(self))]
    pub async fn run_gated(&self, force: bool) -> Result<BriefingOutcome, AppError> {
        let _guard = self.run_lock.lock().await;

        let metadata = RunMetadata::load(self.store.as_ref()).await?;
        if !force {
            if let GateState::Cooling { summary, remaining_hours, last_run } =
                gate::check(&metadata, Utc::now(), self.config.cooldown_hours)
            {
                tracing::info!("Cooling down, {:.2} hours remaining; serving cached summary", remaining_hours);
                return Ok(BriefingOutcome::Cached { summary, remaining_hours, last_run });
            }
        }

        tracing::info!("Running briefing pipeline");
        let summary = self.run_pipeline().await.map_err(|e| {
            tracing::error!("Briefing run failed: {}", e);
            e
        })?;

        let finished_at = Utc::now();
        RunMetadata {
            last_run: Some(finished_at),
            last_summary: summary.clone(),
        }
        .save(self.store.as_ref())
        .await?;

        Ok(BriefingOutcome::Fresh { summary, last_run: finished_at })
    }
}
