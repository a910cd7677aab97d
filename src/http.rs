use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::Method,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::extractor::ytdlp_available;
use crate::models::{Envelope, Formats, MediaType, Uploaded, VideoInfo, VideoUrls};
use crate::service::ExtractionService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExtractionService>,
    pub api_version: String,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/dl", get(download_urls))
        .route("/info", get(video_info))
        .route("/formats", get(formats))
        .route("/merge", get(merge_and_upload));

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .nest(&format!("/api/{}", state.api_version), api)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct MergeQuery {
    #[serde(default)]
    url: String,
    #[serde(default = "default_quality")]
    quality: String,
    #[serde(default = "default_media_type", rename = "type")]
    media_type: String,
    #[serde(default = "default_container")]
    format: String,
}

fn default_quality() -> String {
    "best".to_string()
}

fn default_media_type() -> String {
    "video".to_string()
}

fn default_container() -> String {
    "mp4".to_string()
}

async fn home(State(state): State<AppState>) -> Json<Envelope<serde_json::Value>> {
    let prefix = format!("/api/{}", state.api_version);
    let mut endpoints = serde_json::Map::new();
    endpoints.insert(format!("GET {prefix}/dl"), "Extract direct stream URLs".into());
    endpoints.insert(format!("GET {prefix}/info"), "Get video metadata".into());
    endpoints.insert(format!("GET {prefix}/formats"), "List available formats".into());
    endpoints.insert(
        format!("GET {prefix}/merge"),
        "Download, merge, and upload to storage".into(),
    );
    endpoints.insert("GET /health".to_string(), "Health check".into());

    let data = serde_json::json!({
        "service": "vidgate",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
    });

    Json(Envelope::ok(data, &state.api_version))
}

async fn health(State(state): State<AppState>) -> Json<Envelope<serde_json::Value>> {
    let data = serde_json::json!({
        "status": "healthy",
        "ytdlp_available": ytdlp_available().await,
        "storage_configured": state.service.has_storage(),
        "timestamp": Utc::now().timestamp(),
    });

    Json(Envelope::ok(data, &state.api_version))
}

async fn download_urls(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<Envelope<VideoUrls>>, ApiError> {
    let data = state.service.download_urls(&query.url).await?;
    Ok(Json(Envelope::ok(data, &state.api_version)))
}

async fn video_info(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<Envelope<VideoInfo>>, ApiError> {
    let data = state.service.video_info(&query.url).await?;
    Ok(Json(Envelope::ok(data, &state.api_version)))
}

async fn formats(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<Envelope<Formats>>, ApiError> {
    let data = state.service.formats(&query.url).await?;
    Ok(Json(Envelope::ok(data, &state.api_version)))
}

async fn merge_and_upload(
    State(state): State<AppState>,
    Query(query): Query<MergeQuery>,
) -> Result<Json<Envelope<Uploaded>>, ApiError> {
    let data = state
        .service
        .download_and_upload(
            &query.url,
            &query.quality,
            MediaType::parse(&query.media_type),
            &query.format,
        )
        .await?;
    Ok(Json(Envelope::ok(data, &state.api_version)))
}
