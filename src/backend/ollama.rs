//! Ollama HTTP client.
//!
//! Endpoints used:
//! - POST /api/generate (streamed and non-streamed)
//! - GET /api/tags
//! - POST /api/pull

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{ByteStream, GenerationRequest, InferenceBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct PullBody<'a> {
    name: &'a str,
    stream: bool,
}

/// Client for a single Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    http: Client,
    base_url: String,
    request_timeout: Duration,
    pull_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
            pull_timeout: config.pull_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into [`BackendError::Status`], keeping the body text.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, BackendError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed(e.to_string()))
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ByteStream, BackendError> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: true,
        };

        // No total timeout here: the stream may legitimately run for minutes.
        // Idle reads are bounded by the relay instead.
        let response = self
            .http
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        debug!(model = %request.model, "Backend stream opened");

        Ok(response
            .bytes_stream()
            .map(|item| item.map_err(BackendError::from))
            .boxed())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
        };

        let response = self
            .http
            .post(self.url("/api/generate"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let data: GenerateResponse = decode_json(response).await?;
        Ok(data.response)
    }

    async fn list_models(&self) -> Result<Vec<serde_json::Value>, BackendError> {
        let response = self
            .http
            .get(self.url("/api/tags"))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let data: TagsResponse = decode_json(response).await?;
        Ok(data.models)
    }

    async fn pull_model(&self, name: &str) -> Result<(), BackendError> {
        let body = PullBody { name, stream: false };

        let response = self
            .http
            .post(self.url("/api/pull"))
            .timeout(self.pull_timeout)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
