use axum::{http::StatusCode, response::IntoResponse};
use http_body_util::BodyExt;
use newsbrief::error::{AppError, FetchError};
use serde_json::Value;

// Test for AppError Display implementation
#[test]
fn test_app_error_display() {
    let error = AppError::TrendsRateLimited { attempts: 5 };
    assert_eq!(error.to_string(), "Google Trends fetch failed after 5 rate-limited attempts");

    let error = AppError::SearchFailed(FetchError::Http(502));
    assert_eq!(error.to_string(), "Search API error: upstream returned HTTP 502");

    let error = AppError::StorageError("quota exceeded".to_string());
    assert_eq!(error.to_string(), "Spreadsheet error: quota exceeded");

    let error = AppError::SummarizationError("timeout".to_string());
    assert_eq!(error.to_string(), "Summarization error: timeout");

    let error = AppError::ConfigError("COOLDOWN_HOURS must be positive".to_string());
    assert_eq!(error.to_string(), "Configuration error: COOLDOWN_HOURS must be positive");
}

#[test]
fn test_fetch_error_converts_to_search_failure() {
    let error: AppError = FetchError::Upstream("Invalid API key".to_string()).into();
    assert!(matches!(error, AppError::SearchFailed(FetchError::Upstream(_))));
    assert_eq!(error.to_string(), "Search API error: upstream error: Invalid API key");
}

async fn status_and_message(error: AppError) -> (StatusCode, String) {
    let response = error.into_response();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap();
    (status, body["error"].as_str().unwrap_or_default().to_string())
}

// Test for AppError IntoResponse implementation
#[tokio::test]
async fn test_app_error_into_response() {
    let (status, message) = status_and_message(AppError::TrendsRateLimited { attempts: 5 }).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(message, "Google Trends fetch failed after 5 rate-limited attempts");

    let (status, _) = status_and_message(AppError::SearchFailed(FetchError::Transport("reset".into()))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = status_and_message(AppError::SummarizationError("x".into())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, message) = status_and_message(AppError::StorageError("sheet missing".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(message, "Spreadsheet error: sheet missing");

    let (status, _) = status_and_message(AppError::ConfigError("x".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, message) = status_and_message(AppError::InternalError("boom".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(message, "Internal Server Error: boom");
}
