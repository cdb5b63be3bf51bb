//! HTTP server for the web UI
//!
//! Endpoints:
//! - GET /                    - HTML page (topic form + PDF upload form)
//! - POST /api/survey         - Survey from a title/description (JSON body)
//! - POST /api/survey/upload  - Survey from uploaded PDFs (multipart)
//! - GET /api/status          - Version and model configuration
//!
//! Each pipeline runs on the blocking thread pool; its stages never overlap.

use crate::error::SurveyError;
use crate::papers::arxiv::SortOrder;
use crate::pipeline::{Pipeline, PipelineOutput, RunOptions, SurveyRequest, UploadedDocument};
use crate::settings::Settings;
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const INDEX_HTML: &str = include_str!("ui/index.html");

/// Upper bound on a multipart upload (all files together)
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Upper bound on `max_results` accepted from the browser
const MAX_RESULTS_CAP: usize = 20;

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self { settings: Arc::new(settings) }
    }
}

// ============================================================================
// Error type
// ============================================================================

pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message, "kind": self.kind })),
        )
            .into_response()
    }
}

impl From<SurveyError> for AppError {
    fn from(err: SurveyError) -> Self {
        let status = match &err {
            SurveyError::InputRejected(_) => StatusCode::BAD_REQUEST,
            SurveyError::NoResults => StatusCode::NOT_FOUND,
            SurveyError::Upstream(_) | SurveyError::Fetch(_) | SurveyError::Download { .. } => {
                StatusCode::BAD_GATEWAY
            }
            SurveyError::Configuration(_) | SurveyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError { status, kind: err.kind(), message: err.to_string() }
    }
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError { status: StatusCode::BAD_REQUEST, kind: "input_rejected", message: msg.into() }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError { status: rejection.status(), kind: "input_rejected", message: rejection.body_text() }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError { status: rejection.status(), kind: "input_rejected", message: rejection.body_text() }
    }
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct TopicRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    instructions: Option<String>,
    max_results: Option<usize>,
    sort_by: Option<SortOrder>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
    model: String,
    api_key_configured: bool,
    max_results: usize,
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/survey", post(survey_handler))
        .route("/api/survey/upload", post(upload_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run one pipeline on the blocking pool
async fn run_pipeline(
    settings: Arc<Settings>,
    request: SurveyRequest,
    options: RunOptions,
) -> Result<PipelineOutput, AppError> {
    // Bad input is reported before a missing key or any client setup
    request.validate()?;

    let request_id = uuid::Uuid::new_v4().to_string();
    let joined = tokio::task::spawn_blocking(move || {
        let span = tracing::info_span!("survey", id = %&request_id[..8]);
        let _guard = span.enter();
        let pipeline = Pipeline::from_settings(&settings)?;
        pipeline.run(request, &options, |stage| tracing::info!("{}", stage.label()))
    })
    .await
    .map_err(|e| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        kind: "internal",
        message: format!("Survey task failed: {}", e),
    })?;

    joined.map_err(|e| {
        if e.is_fault() {
            tracing::error!(kind = e.kind(), "{}", e);
        } else {
            tracing::info!(kind = e.kind(), "{}", e);
        }
        AppError::from(e)
    })
}

// ============================================================================
// Handlers
// ============================================================================

// GET /
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// GET /api/status
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let settings = &state.settings;
    Json(StatusResponse {
        status: "ok",
        version: VERSION,
        backend: settings.llm_backend.as_str(),
        model: settings.model_name().to_string(),
        api_key_configured: settings.has_api_key(),
        max_results: settings.max_results,
    })
}

// POST /api/survey
async fn survey_handler(
    State(state): State<AppState>,
    payload: Result<Json<TopicRequest>, JsonRejection>,
) -> Result<Json<PipelineOutput>, AppError> {
    let Json(req) = payload?;
    let mut options = RunOptions::from_settings(&state.settings);
    options.instructions = req.instructions;
    if let Some(n) = req.max_results {
        options.max_results = n.clamp(1, MAX_RESULTS_CAP);
    }
    if let Some(sort) = req.sort_by {
        options.sort_order = sort;
    }

    tracing::info!(title = %req.title, "[POST /api/survey]");
    let request = SurveyRequest::Topic { title: req.title, description: req.description };
    let output = run_pipeline(state.settings.clone(), request, options).await?;
    Ok(Json(output))
}

// POST /api/survey/upload
async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PipelineOutput>, AppError> {
    let mut multipart = multipart?;
    let mut options = RunOptions::from_settings(&state.settings);
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?
    {
        match field.name() {
            Some("file") | Some("files") => {
                let name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?;
                if bytes.is_empty() {
                    continue;
                }
                documents.push(UploadedDocument { name, bytes: bytes.to_vec() });
            }
            Some("instructions") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Invalid instructions field: {}", e)))?;
                options.instructions = Some(text);
            }
            _ => {}
        }
    }

    tracing::info!(files = documents.len(), "[POST /api/survey/upload]");
    let output = run_pipeline(state.settings.clone(), SurveyRequest::Uploads(documents), options).await?;
    Ok(Json(output))
}
