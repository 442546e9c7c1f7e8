//! HTTP routes for the ingestion server

pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{get, post},
    Json, Router,
};

use crate::server::{middleware::admission, state::AppState};

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build all routes; admission control applies to uploads only
pub fn api_routes(state: AppState) -> Router<AppState> {
    let body_limit = state
        .config()
        .pipeline
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/upload",
            post(upload::upload_document)
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(middleware::from_fn_with_state(state, admission)),
        )
        .route("/api/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    Json(serde_json::json!({
        "name": "quote-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Stores uploaded quotes, extracts their data with Gemini, and records the result",
        "endpoints": {
            "POST /upload": "Upload one document (multipart field 'file')",
            "GET /health": "Liveness check",
            "GET /api/info": "This document"
        },
        "limits": {
            "max_upload_bytes": config.pipeline.max_upload_bytes,
            "requests_per_window": config.admission.max_requests,
            "window_secs": config.admission.window_secs
        },
        "providers": state.orchestrator().describe()
    }))
}
