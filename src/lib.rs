use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod enrich;
pub mod error;
pub mod gate;
pub mod llm;
pub mod pipeline;
pub mod retry;
pub mod routes;
pub mod rows;
pub mod search;
pub mod sheets;
pub mod summary;

use config::Config;
use error::AppError;
use llm::OpenAiClient;
use pipeline::BriefingService;
use search::SerpApiClient;
use sheets::{GoogleSheetsClient, MemorySheetStore, ServiceAccountKey, SheetStore};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BriefingService>,
}

impl AppState {
    pub fn new(service: BriefingService) -> Self {
        Self { service: Arc::new(service) }
    }

    /// Wire the real SerpAPI, spreadsheet and OpenAI clients from `config`.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let search = SerpApiClient::new(&config)?;
        let summarizer = OpenAiClient::new(&config)?;
        let store = sheet_store(&config)?;
        Ok(Self::new(BriefingService::new(
            config,
            Arc::new(search),
            store,
            Arc::new(summarizer),
        )))
    }
}

/// Google Sheets when both settings are present, otherwise a process-local store.
pub fn sheet_store(config: &Config) -> Result<Arc<dyn SheetStore>, AppError> {
    match (&config.spreadsheet_id, &config.service_account_file) {
        (Some(id), Some(path)) => {
            let key = ServiceAccountKey::from_file(path)?;
            tracing::info!("Using Google spreadsheet {}", id);
            Ok(Arc::new(GoogleSheetsClient::new(id, key)?))
        }
        _ => {
            tracing::warn!(
                "SPREADSHEET_ID or GOOGLE_SERVICE_ACCOUNT_FILE not set; continuing with in-memory sheets"
            );
            Ok(Arc::new(MemorySheetStore::new()))
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Service is healthy")
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "NEWSBRIEF API",
        version = "0.1.0",
        description = "Trending ASX news briefings for financial journalists"
    ),
    paths(
        routes::create_briefing,
        health_check
    ),
    components(schemas(
        routes::BriefingResponse,
        routes::BriefingStatus
    ))
)]
struct ApiDoc;

/// Create the application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let api_doc = ApiDoc::openapi();
    let rate_limit_burst = state.service.config().rate_limit_burst;

    let mut api_routes = Router::new()
        .route("/api/briefing", post(routes::create_briefing))
        .with_state(state);

    if let Some(burst) = rate_limit_burst {
        match GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .period(std::time::Duration::from_secs(60))
            .burst_size(burst)
            .finish()
        {
            Some(conf) => {
                api_routes = api_routes.layer(GovernorLayer { config: Arc::new(conf) });
            }
            None => tracing::warn!("Invalid rate limit settings (burst {}); limiter disabled", burst),
        }
    }

    let docs_router = SwaggerUi::new("/docs").url("/api-doc/openapi.json", api_doc);

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(health_check))
        .merge(api_routes)
        .merge(docs_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
