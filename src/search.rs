//! SerpAPI client for the three searches the briefing is built from.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

use crate::config::Config;
use crate::error::FetchError;

/// One record as returned by the search API, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    /// Usually a string ("+250%", "Breakout") but sometimes a bare number.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl RawRecord {
    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Related-query lists from Google Trends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendsResult {
    pub rising: Vec<RawRecord>,
    pub top: Vec<RawRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    News,
    TopStories,
    Trends,
}

/// The search boundary. Each call is a single attempt; retrying is the caller's business.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn news(&self) -> Result<Vec<RawRecord>, FetchError>;
    async fn top_stories(&self) -> Result<Vec<RawRecord>, FetchError>;
    async fn trends(&self) -> Result<TrendsResult, FetchError>;
}

#[derive(Debug, Default, Deserialize)]
struct RelatedQueries {
    #[serde(default)]
    rising: Vec<RawRecord>,
    #[serde(default)]
    top: Vec<RawRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    news_results: Vec<RawRecord>,
    #[serde(default)]
    top_stories: Vec<RawRecord>,
    #[serde(default)]
    related_queries: RelatedQueries,
    #[serde(default)]
    error: Option<String>,
}

pub struct SerpApiClient {
    http: Client,
    api_key: String,
    base_url: String,
    query: String,
    trends_topic: String,
}

impl SerpApiClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key: config.serpapi_api_key.clone(),
            base_url: config.serpapi_base_url.trim_end_matches('/').to_string(),
            query: config.news_query.clone(),
            trends_topic: config.trends_topic.clone(),
        })
    }

    /// Fixed parameter set for each search kind (without the api key).
    pub fn params(&self, kind: SearchKind) -> Vec<(&'static str, String)> {
        match kind {
            SearchKind::News => vec![
                ("engine", "google".to_string()),
                ("no_cache", "true".to_string()),
                ("q", self.query.clone()),
                ("google_domain", "google.com.au".to_string()),
                ("tbs", "qdr:d".to_string()),
                ("gl", "au".to_string()),
                ("hl", "en".to_string()),
                ("location", "Australia".to_string()),
                ("tbm", "nws".to_string()),
                ("num", "40".to_string()),
            ],
            SearchKind::TopStories => vec![
                ("engine", "google".to_string()),
                ("q", self.query.clone()),
                ("hl", "en".to_string()),
                ("gl", "au".to_string()),
            ],
            SearchKind::Trends => vec![
                ("engine", "google_trends".to_string()),
                ("q", self.trends_topic.clone()),
                ("geo", "AU".to_string()),
                ("data_type", "RELATED_QUERIES".to_string()),
                ("tz", "-600".to_string()),
                ("date", "now 4-H".to_string()),
            ],
        }
    }

    #[tracing::instrument(skip(self))]
    async fn search(&self, kind: SearchKind) -> Result<SerpApiResponse, FetchError> {
        let url = format!("{}/search.json", self.base_url);
        let mut params = self.params(kind);
        params.push(("api_key", self.api_key.clone()));

        let response = self.http.get(&url).query(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("SerpAPI {:?} responded {} ({} bytes)", kind, status, body.len());

        let parsed = serde_json::from_str::<SerpApiResponse>(&body);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if let Ok(SerpApiResponse { error: Some(message), .. }) = &parsed {
            return classify_api_error(message).map(|_| SerpApiResponse::default());
        }
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        parsed.map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// SerpAPI reports some conditions in an `error` field. "No results" is an empty
/// result; throughput limits are the rate-limit signal; anything else is fatal.
fn classify_api_error(message: &str) -> Result<(), FetchError> {
    let lower = message.to_lowercase();
    if lower.contains("hasn't returned any results") || lower.contains("no results") {
        tracing::info!("SerpAPI returned no results: {}", message);
        Ok(())
    } else if lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("throughput")
    {
        Err(FetchError::RateLimited)
    } else {
        Err(FetchError::Upstream(message.to_string()))
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn news(&self) -> Result<Vec<RawRecord>, FetchError> {
        Ok(self.search(SearchKind::News).await?.news_results)
    }

    async fn top_stories(&self) -> Result<Vec<RawRecord>, FetchError> {
        Ok(self.search(SearchKind::TopStories).await?.top_stories)
    }

    async fn trends(&self) -> Result<TrendsResult, FetchError> {
        let related = self.search(SearchKind::Trends).await?.related_queries;
        Ok(TrendsResult {
            rising: related.rising,
            top: related.top,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: String) -> SerpApiClient {
        let config = Config {
            serpapi_api_key: "test-key".to_string(),
            serpapi_base_url: base_url,
            ..Config::default()
        };
        SerpApiClient::new(&config).unwrap()
    }

    async fn fake_serpapi(Query(params): Query<HashMap<String, String>>) -> (AxumStatus, Json<Value>) {
        assert_eq!(params.get("api_key").map(String::as_str), Some("test-key"));
        match params.get("engine").map(String::as_str) {
            Some("google_trends") => (
                AxumStatus::OK,
                Json(json!({
                    "related_queries": {
                        "rising": [{"query": "asx today", "value": "Breakout", "extracted_value": 5000}],
                        "top": [{"query": "asx", "value": 100}]
                    }
                })),
            ),
            Some("google") if params.contains_key("tbm") => (
                AxumStatus::OK,
                Json(json!({
                    "news_results": [
                        {"title": "ASX closes higher", "link": "https://news.example/a", "snippet": "Up 1%", "source": "X"}
                    ]
                })),
            ),
            _ => (AxumStatus::OK, Json(json!({"search_metadata": {"status": "Success"}}))),
        }
    }

    #[tokio::test]
    async fn parses_each_search_kind() {
        let base = serve(Router::new().route("/search.json", get(fake_serpapi))).await;
        let client = client_for(base);

        let news = client.news().await.unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].link.as_deref(), Some("https://news.example/a"));

        // missing key means no results, not an error
        assert!(client.top_stories().await.unwrap().is_empty());

        let trends = client.trends().await.unwrap();
        assert_eq!(trends.rising[0].value_text().as_deref(), Some("Breakout"));
        assert_eq!(trends.top[0].value_text().as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn maps_status_and_error_bodies_to_fetch_errors() {
        let router = Router::new()
            .route(
                "/limited/search.json",
                get(|| async { (AxumStatus::TOO_MANY_REQUESTS, Json(json!({"error": "slow down"}))) }),
            )
            .route(
                "/empty/search.json",
                get(|| async {
                    (AxumStatus::OK, Json(json!({"error": "Google hasn't returned any results for this query."})))
                }),
            )
            .route(
                "/broken/search.json",
                get(|| async { (AxumStatus::UNAUTHORIZED, Json(json!({"error": "Invalid API key."}))) }),
            )
            .route("/down/search.json", get(|| async { (AxumStatus::BAD_GATEWAY, "nope") }));
        let base = serve(router).await;

        let limited = client_for(format!("{}/limited", base));
        assert_eq!(limited.trends().await.unwrap_err(), FetchError::RateLimited);

        let empty = client_for(format!("{}/empty", base));
        assert!(empty.news().await.unwrap().is_empty());

        let broken = client_for(format!("{}/broken", base));
        assert!(matches!(broken.news().await.unwrap_err(), FetchError::Upstream(_)));

        let down = client_for(format!("{}/down", base));
        assert_eq!(down.top_stories().await.unwrap_err(), FetchError::Http(502));
    }

    #[test]
    fn news_params_target_australia() {
        let client = client_for("http://unused".to_string());
        let params: HashMap<_, _> = client.params(SearchKind::News).into_iter().collect();
        assert_eq!(params["gl"], "au");
        assert_eq!(params["hl"], "en");
        assert_eq!(params["tbs"], "qdr:d");
        assert_eq!(params["q"], "asx 200");
        let trends: HashMap<_, _> = client.params(SearchKind::Trends).into_iter().collect();
        assert_eq!(trends["date"], "now 4-H");
        assert_eq!(trends["data_type"], "RELATED_QUERIES");
    }
}
