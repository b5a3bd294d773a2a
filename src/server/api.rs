//! HTTP API.
//!
//! - POST /generate
//! - GET /models
//! - POST /models/download?model_name=...
//! - POST /conversation/start?conv_id=...
//! - POST /conversation/{conv_id}/message
//! - GET /conversation/{conv_id}
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::RelayError;
use crate::relay::conversation::Conversation;
use crate::relay::Relay;
use crate::server::streaming::chunked_text_response;

/// Application state shared across handlers.
pub struct AppState {
    pub relay: Relay,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/models", get(list_models))
        .route("/models/download", post(download_model))
        .route("/conversation/start", post(start_conversation))
        .route("/conversation/{conv_id}/message", post(add_message))
        .route("/conversation/{conv_id}", get(get_conversation))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Body of /generate and /conversation/{id}/message.
#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub model_name: String,
}

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub conv_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedTextResponse {
    pub generated_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub conversations: usize,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(query): Json<GenerateQuery>,
) -> Result<Response, RelayError> {
    let request_id = Uuid::new_v4().to_string();
    let request = state.relay.request(query.prompt, query.model);

    info!(
        request_id,
        model = %request.model,
        prompt_bytes = request.prompt.len(),
        "Generation request"
    );

    let chunks = state.relay.stream_generation(request, request_id).await?;
    Ok(chunked_text_response(chunks))
}

async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelsResponse>, RelayError> {
    let models = state.relay.list_models().await?;
    Ok(Json(ModelsResponse { models }))
}

async fn download_model(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<Json<MessageResponse>, RelayError> {
    let message = state.relay.download_model(&params.model_name).await?;
    Ok(Json(MessageResponse { message }))
}

async fn start_conversation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StartParams>,
) -> Result<Json<MessageResponse>, RelayError> {
    let message = state.relay.start_conversation(&params.conv_id).await?;
    Ok(Json(MessageResponse { message }))
}

async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(conv_id): Path<String>,
    Json(query): Json<GenerateQuery>,
) -> Result<Json<GeneratedTextResponse>, RelayError> {
    let request = state.relay.request(query.prompt, query.model);
    info!(conv_id, model = %request.model, "Conversation turn");

    let generated_text = state.relay.add_message(&conv_id, request).await?;
    Ok(Json(GeneratedTextResponse { generated_text }))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conv_id): Path<String>,
) -> Result<Json<Conversation>, RelayError> {
    Ok(Json(state.relay.get_conversation(&conv_id).await?))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        conversations: state.relay.conversations().len().await,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.relay.metrics().render(),
    )
}
