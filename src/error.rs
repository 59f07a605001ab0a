use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Outcome kinds of a single upstream fetch. Callers match on these to decide
/// between retrying, substituting a sentinel or aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    RateLimited,
    Transport(String),
    Http(u16),
    Parse(String),
    Upstream(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::RateLimited => write!(f, "rate limited by upstream"),
            FetchError::Transport(msg) => write!(f, "transport error: {}", msg),
            FetchError::Http(status) => write!(f, "upstream returned HTTP {}", status),
            FetchError::Parse(msg) => write!(f, "could not parse upstream response: {}", msg),
            FetchError::Upstream(msg) => write!(f, "upstream error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Http(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    /// The trends endpoint kept rate limiting us until the attempt ceiling.
    TrendsRateLimited { attempts: u32 },
    SearchFailed(FetchError),
    StorageError(String),
    SummarizationError(String),
    ConfigError(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::TrendsRateLimited { attempts } => write!(
                f,
                "Google Trends fetch failed after {} rate-limited attempts",
                attempts
            ),
            AppError::SearchFailed(err) => write!(f, "Search API error: {}", err),
            AppError::StorageError(msg) => write!(f, "Spreadsheet error: {}", msg),
            AppError::SummarizationError(msg) => write!(f, "Summarization error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::SearchFailed(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::TrendsRateLimited { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SearchFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::SummarizationError(_) => StatusCode::BAD_GATEWAY,
            AppError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
