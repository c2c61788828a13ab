//! HTTP surface: analyze, extract clips, transcripts and static clip files.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Method, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use log::info;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::Timestamp;
use crate::clip::CLIPS_URL_PREFIX;
use crate::error::PipelineError;
use crate::pipeline::{ClipMode, Pipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractClipsRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    timestamps: Vec<Timestamp>,
    #[serde(default)]
    mode: ClipMode,
}

#[derive(Debug, Deserialize)]
struct PlaylistTranscriptsRequest {
    #[serde(default)]
    playlist_urls: Vec<String>,
}

/// Build the application router
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let clip_root = pipeline.clip_store().root().to_path_buf();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/video/analyze", post(analyze_handler))
        .route("/api/video/extract_clips", post(extract_clips_handler))
        .route("/api/playlist/transcripts", post(playlist_transcripts_handler))
        .nest_service(&format!("/{CLIPS_URL_PREFIX}"), ServeDir::new(clip_root))
        .with_state(AppState { pipeline })
        .layer(cors)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(pipeline: Arc<Pipeline>, addr: &str) -> eyre::Result<()> {
    tokio::fs::create_dir_all(pipeline.clip_store().root()).await?;
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, PipelineError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| PipelineError::Validation(format!("invalid request body: {}", e.body_text())))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn analyze_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Response, PipelineError> {
    let req = body(payload)?;
    let analysis = state.pipeline.analyze(&req.urls, &req.keywords).await?;
    Ok(Json(analysis).into_response())
}

async fn extract_clips_handler(
    State(state): State<AppState>,
    payload: Result<Json<ExtractClipsRequest>, JsonRejection>,
) -> Result<Response, PipelineError> {
    let req = body(payload)?;
    let clips = state
        .pipeline
        .extract_clips(&req.url, &req.timestamps, req.mode)
        .await?;
    Ok(Json(clips).into_response())
}

async fn playlist_transcripts_handler(
    State(state): State<AppState>,
    payload: Result<Json<PlaylistTranscriptsRequest>, JsonRejection>,
) -> Result<Response, PipelineError> {
    let req = body(payload)?;
    let set = state.pipeline.playlist_transcripts(&req.playlist_urls).await?;
    Ok(Json(set).into_response())
}
