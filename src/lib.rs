//! ollama-relay: streaming HTTP relay in front of a local Ollama server.
//!
//! Forwards generation requests to the backend and re-chunks the streamed
//! output into pieces of at least `streaming.chunk_size` UTF-8 bytes. Keeps a
//! simple in-memory multi-turn conversation history for the lifetime of the
//! process.

pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod server;

use std::sync::Arc;

use backend::ollama::OllamaBackend;
use config::Config;
use metrics::Metrics;
use relay::Relay;
use server::api::{build_router, AppState};

/// Wire a relay against the Ollama server named in `config` and return the
/// HTTP router serving it.
pub fn app(config: &Config) -> anyhow::Result<axum::Router> {
    let backend = OllamaBackend::new(&config.backend)?;
    let metrics = Metrics::new()?;
    let relay = Relay::new(Arc::new(backend), config, metrics);
    Ok(build_router(Arc::new(AppState::new(relay))))
}
