//! Inference backend abstraction.
//!
//! - [`ollama`]: reqwest client for the Ollama HTTP API
//!
//! The relay only talks to the backend through [`InferenceBackend`], so tests
//! can substitute a scripted implementation.

pub mod ollama;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Raw body of a streamed generation, as delivered by the backend.
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// A single generation call against a named model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Open a streamed generation. Resolves once the backend has answered
    /// with a success status; the body is read lazily from the returned stream.
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ByteStream, BackendError>;

    /// Run a generation to completion and return the full text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;

    /// Catalog of locally available models, exactly as the backend lists them.
    async fn list_models(&self) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Ask the backend to fetch a model.
    async fn pull_model(&self, name: &str) -> Result<(), BackendError>;
}
