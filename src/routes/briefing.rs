use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::gate::format_timestamp;
use crate::pipeline::BriefingOutcome;
use crate::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BriefingStatus {
    /// Served from the last run because the cooldown has not elapsed
    Cached,
    /// Produced by a pipeline run triggered by this request
    Fresh,
}

/// Briefing returned to the page
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct BriefingResponse {
    pub status: BriefingStatus,
    /// Summary text exactly as the model produced it
    pub summary: String,
    /// Hours until a new run is allowed; 0 for a fresh briefing
    pub remaining_hours: f64,
    /// Time of the run this summary came from, UTC (`YYYY-MM-DD HH:MM:SS`)
    pub last_run_utc: String,
    /// Same instant in the display timezone
    pub last_run_local: String,
}

impl BriefingResponse {
    pub fn from_outcome(outcome: BriefingOutcome, display_tz: Tz) -> Self {
        let local = |at: DateTime<Utc>| at.with_timezone(&display_tz).format("%Y-%m-%d %H:%M:%S %Z").to_string();
        match outcome {
            BriefingOutcome::Cached { summary, remaining_hours, last_run } => BriefingResponse {
                status: BriefingStatus::Cached,
                summary,
                remaining_hours,
                last_run_utc: format_timestamp(last_run),
                last_run_local: local(last_run),
            },
            BriefingOutcome::Fresh { summary, last_run } => BriefingResponse {
                status: BriefingStatus::Fresh,
                summary,
                remaining_hours: 0.0,
                last_run_utc: format_timestamp(last_run),
                last_run_local: local(last_run),
            },
        }
    }
}

/// Get the latest briefing, running the pipeline if the cooldown has elapsed
#[utoipa::path(
    post,
    path = "/api/briefing",
    responses(
        (status = 200, description = "Cached or freshly generated briefing", body = BriefingResponse),
        (status = 502, description = "Search or language model API failed"),
        (status = 503, description = "Google Trends kept rate limiting the run"),
        (status = 500, description = "Spreadsheet or internal error")
    ),
    tag = "Briefing"
)]
pub async fn create_briefing(State(state): State<AppState>) -> Result<Json<BriefingResponse>, AppError> {
    let outcome = state.service.run_gated(false).await?;
    let response = BriefingResponse::from_outcome(outcome, state.service.config().display_timezone);
    tracing::info!(status = ?response.status, "Returning briefing");
    Ok(Json(response))
}
