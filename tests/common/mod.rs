//! Fake Ollama server and request helpers shared by the integration tests.

#![allow(dead_code)]

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use ollama_relay::config::Config;

/// Address nothing listens on.
pub const UNREACHABLE_BACKEND: &str = "http://127.0.0.1:1";

/// Bytes per write when the fake streams a body.
const STREAM_PIECE: usize = 7;

/// Model the fake answers with a 500.
pub const BROKEN_MODEL: &str = "broken";

/// Model whose stream dies partway through.
pub const FLAKY_MODEL: &str = "flaky";

fn reply_words(prompt: &str) -> Vec<String> {
    let count = if prompt.starts_with("long") { 400 } else { 3 };
    (0..count).map(|i| format!("wörd{i}€ ")).collect()
}

/// Text the fake generates for a prompt.
pub fn reply(prompt: &str) -> String {
    reply_words(prompt).concat()
}

/// Exact NDJSON body the fake streams for a prompt.
pub fn stream_body(model: &str, prompt: &str) -> String {
    let mut out = String::new();
    for word in reply_words(prompt) {
        out.push_str(&json!({"model": model, "response": word, "done": false}).to_string());
        out.push('\n');
    }
    out.push_str(&json!({"model": model, "response": "", "done": true}).to_string());
    out.push('\n');
    out
}

pub fn model_catalog() -> Value {
    json!([
        {"name": "llama2:latest", "size": 3826793677u64, "digest": "78e26419b446"},
        {"name": "mistral:7b", "size": 4109865159u64, "digest": "f974a74358d6"},
        {"name": "codellama:13b", "size": 7365960935u64, "digest": "9f438cb9cd58"}
    ])
}

async fn generate(Json(body): Json<Value>) -> Response {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    let stream = body["stream"].as_bool().unwrap_or(true);

    if model == BROKEN_MODEL {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "model runner crashed"})),
        )
            .into_response();
    }

    if !stream {
        return Json(json!({"model": model, "response": reply(&prompt), "done": true}))
            .into_response();
    }

    let full = stream_body(&model, &prompt).into_bytes();
    let pieces: Vec<Bytes> = full
        .chunks(STREAM_PIECE)
        .map(Bytes::copy_from_slice)
        .collect();

    if model == FLAKY_MODEL {
        let good = pieces.into_iter().take(3000 / STREAM_PIECE).map(Ok);
        let broken = std::iter::once(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "runner died",
        )));
        let body = Body::from_stream(futures::stream::iter(good.chain(broken)));
        return body.into_response();
    }

    Body::from_stream(futures::stream::iter(pieces.into_iter().map(Ok::<_, Infallible>)))
        .into_response()
}

async fn tags() -> Json<Value> {
    Json(json!({"models": model_catalog()}))
}

async fn pull(Json(body): Json<Value>) -> Response {
    match body["name"].as_str() {
        Some("missing") => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "pull model manifest: file does not exist"})),
        )
            .into_response(),
        Some(_) => Json(json!({"status": "success"})).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Start a fake Ollama server on an ephemeral port and return its base URL.
pub async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/generate", post(generate))
        .route("/api/tags", get(tags))
        .route("/api/pull", post(pull));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Relay router pointed at `base_url`.
pub fn relay(base_url: &str) -> Router {
    relay_with(base_url, |_| {})
}

pub fn relay_with(base_url: &str, tweak: impl FnOnce(&mut Config)) -> Router {
    let mut config = Config::default();
    config.backend.base_url = base_url.to_string();
    config.backend.connect_timeout_secs = 2;
    tweak(&mut config);
    ollama_relay::app(&config).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

pub fn get_req(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Send a request and read the whole body as JSON.
pub async fn call_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Send a request and collect the body frame by frame.
pub async fn call_frames(app: &Router, request: Request<Body>) -> (StatusCode, Vec<Bytes>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let frames = response
        .into_body()
        .into_data_stream()
        .map(|frame| frame.unwrap())
        .collect()
        .await;
    (status, frames)
}
