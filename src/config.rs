use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Runtime settings for every component, loaded once and passed to constructors.
#[derive(Debug, Clone)]
pub struct Config {
    pub serpapi_api_key: String,
    pub serpapi_base_url: String,
    /// Query used for both the news and the top-stories searches.
    pub news_query: String,
    /// Google Trends topic id ("/m/0bl5c2" is the S&P/ASX 200).
    pub trends_topic: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub spreadsheet_id: Option<String>,
    pub service_account_file: Option<PathBuf>,
    pub cooldown_hours: f64,
    pub cap_news: usize,
    pub cap_top_stories: usize,
    pub cap_trends: usize,
    pub enrich_concurrency: usize,
    pub enrich_timeout: Duration,
    pub trends_max_attempts: u32,
    pub trends_base_delay: Duration,
    pub display_timezone: chrono_tz::Tz,
    pub bind_addr: String,
    /// Burst size per client IP on the API routes, refilled one request per minute; `None` disables the limiter.
    pub rate_limit_burst: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serpapi_api_key: String::new(),
            serpapi_base_url: DEFAULT_SERPAPI_BASE_URL.to_string(),
            news_query: "asx 200".to_string(),
            trends_topic: "/m/0bl5c2".to_string(),
            openai_api_key: String::new(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: "gpt-4.1".to_string(),
            spreadsheet_id: None,
            service_account_file: None,
            cooldown_hours: 3.0,
            cap_news: 40,
            cap_top_stories: 40,
            cap_trends: 20,
            enrich_concurrency: 10,
            enrich_timeout: Duration::from_secs(10),
            trends_max_attempts: 5,
            trends_base_delay: Duration::from_secs(10),
            display_timezone: chrono_tz::Australia::Sydney,
            bind_addr: "127.0.0.1:3000".to_string(),
            rate_limit_burst: None,
        }
    }
}

impl Config {
    /// Build the configuration from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let display_timezone = match get("DISPLAY_TIMEZONE") {
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map_err(|e| AppError::ConfigError(format!("DISPLAY_TIMEZONE {}: {}", name, e)))?,
            None => defaults.display_timezone,
        };

        let cooldown_hours: f64 = parse_or("COOLDOWN_HOURS", get("COOLDOWN_HOURS"), defaults.cooldown_hours)?;
        if !cooldown_hours.is_finite() || cooldown_hours < 0.0 {
            return Err(AppError::ConfigError(format!(
                "COOLDOWN_HOURS must be a non-negative number, got {}",
                cooldown_hours
            )));
        }

        let enrich_concurrency: usize =
            parse_or("ENRICH_CONCURRENCY", get("ENRICH_CONCURRENCY"), defaults.enrich_concurrency)?;
        if enrich_concurrency == 0 {
            return Err(AppError::ConfigError("ENRICH_CONCURRENCY must be at least 1".to_string()));
        }

        let trends_max_attempts: u32 =
            parse_or("TRENDS_MAX_ATTEMPTS", get("TRENDS_MAX_ATTEMPTS"), defaults.trends_max_attempts)?;
        if trends_max_attempts == 0 {
            return Err(AppError::ConfigError("TRENDS_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        Ok(Config {
            serpapi_api_key: get("SERPAPI_API_KEY").unwrap_or_default(),
            serpapi_base_url: get("SERPAPI_BASE_URL").unwrap_or(defaults.serpapi_base_url),
            news_query: get("NEWS_QUERY").unwrap_or(defaults.news_query),
            trends_topic: get("TRENDS_TOPIC").unwrap_or(defaults.trends_topic),
            openai_api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            spreadsheet_id: get("SPREADSHEET_ID"),
            service_account_file: get("GOOGLE_SERVICE_ACCOUNT_FILE").map(PathBuf::from),
            cooldown_hours,
            cap_news: parse_or("CAP_NEWS", get("CAP_NEWS"), defaults.cap_news)?,
            cap_top_stories: parse_or("CAP_TOP_STORIES", get("CAP_TOP_STORIES"), defaults.cap_top_stories)?,
            cap_trends: parse_or("CAP_TRENDS", get("CAP_TRENDS"), defaults.cap_trends)?,
            enrich_concurrency,
            enrich_timeout: Duration::from_secs(parse_or(
                "ENRICH_TIMEOUT_SECS",
                get("ENRICH_TIMEOUT_SECS"),
                defaults.enrich_timeout.as_secs(),
            )?),
            trends_max_attempts,
            trends_base_delay: Duration::from_secs(parse_or(
                "TRENDS_BASE_DELAY_SECS",
                get("TRENDS_BASE_DELAY_SECS"),
                defaults.trends_base_delay.as_secs(),
            )?),
            display_timezone,
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            rate_limit_burst: match get("RATE_LIMIT_BURST") {
                Some(raw) => Some(parse_or("RATE_LIMIT_BURST", Some(raw), 0u32)?).filter(|n| *n > 0),
                None => None,
            },
        })
    }

    /// True when both halves of the Google Sheets configuration are present.
    pub fn uses_google_sheets(&self) -> bool {
        self.spreadsheet_id.is_some() && self.service_account_file.is_some()
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("{}={}: {}", key, value, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_briefing_pipeline() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.cap_news, 40);
        assert_eq!(config.cap_top_stories, 40);
        assert_eq!(config.cap_trends, 20);
        assert_eq!(config.enrich_concurrency, 10);
        assert_eq!(config.enrich_timeout, Duration::from_secs(10));
        assert_eq!(config.trends_max_attempts, 5);
        assert_eq!(config.trends_base_delay, Duration::from_secs(10));
        assert_eq!(config.cooldown_hours, 3.0);
        assert_eq!(config.display_timezone, chrono_tz::Australia::Sydney);
        assert!(config.rate_limit_burst.is_none());
        assert!(!config.uses_google_sheets());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("COOLDOWN_HOURS", "1.5"),
            ("CAP_NEWS", "5"),
            ("SPREADSHEET_ID", "abc"),
            ("GOOGLE_SERVICE_ACCOUNT_FILE", "/tmp/sa.json"),
            ("DISPLAY_TIMEZONE", "Australia/Perth"),
            ("RATE_LIMIT_BURST", "10"),
            ("OPENAI_MODEL", "  "),
        ]))
        .unwrap();
        assert_eq!(config.cooldown_hours, 1.5);
        assert_eq!(config.cap_news, 5);
        assert!(config.uses_google_sheets());
        assert_eq!(config.display_timezone, chrono_tz::Australia::Perth);
        assert_eq!(config.rate_limit_burst, Some(10));
        // Blank values fall back to defaults
        assert_eq!(config.openai_model, "gpt-4.1");
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = Config::from_lookup(lookup(&[("CAP_TRENDS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("CAP_TRENDS"));

        let err = Config::from_lookup(lookup(&[("COOLDOWN_HOURS", "-1")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = Config::from_lookup(lookup(&[("ENRICH_CONCURRENCY", "0")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = Config::from_lookup(lookup(&[("TRENDS_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(err.to_string().contains("TRENDS_MAX_ATTEMPTS must be at least 1"));
    }
}
