//! The relay service: every operation the HTTP surface exposes.
//!
//! - [`chunker`]: incremental UTF-8 decoding and size-threshold chunking
//! - [`conversation`]: in-memory conversation registry
//!
//! Streamed generation runs as a small pipeline. A spawned reader pulls the
//! backend body, feeds it through a [`ChunkBuffer`] and pushes chunks into a
//! bounded channel; the HTTP body drains the other end. A slow client fills
//! the channel and stalls the reader. A vanished client closes the channel and
//! the reader drops the backend response.

pub mod chunker;
pub mod conversation;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::backend::{ByteStream, GenerationRequest, InferenceBackend};
use crate::config::Config;
use crate::error::{BackendError, RelayError};
use crate::metrics::Metrics;
use chunker::ChunkBuffer;
use conversation::{Conversation, ConversationStore, Message};

/// Lazy, finite sequence of text chunks for one streamed generation.
pub type ChunkStream = ReceiverStream<String>;

pub struct Relay {
    backend: Arc<dyn InferenceBackend>,
    conversations: ConversationStore,
    metrics: Metrics,
    default_model: String,
    chunk_size: usize,
    channel_capacity: usize,
    stream_idle_timeout: Duration,
    rollback_on_failure: bool,
}

impl Relay {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &Config, metrics: Metrics) -> Self {
        Self {
            backend,
            conversations: ConversationStore::new(),
            metrics,
            default_model: config.backend.default_model.clone(),
            chunk_size: config.streaming.chunk_size,
            channel_capacity: config.streaming.channel_capacity,
            stream_idle_timeout: config.backend.stream_idle_timeout(),
            rollback_on_failure: config.conversation.rollback_on_failure,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Build a backend request. The default model applies only when the
    /// client named none; an explicit name is forwarded as given.
    pub fn request(&self, prompt: String, model: Option<String>) -> GenerationRequest {
        GenerationRequest {
            model: model.unwrap_or_else(|| self.default_model.clone()),
            prompt,
        }
    }

    /// Open a streamed generation and re-chunk its body.
    ///
    /// Fails only if the backend cannot be reached or refuses the request.
    /// Once this returns, failures end the stream early instead.
    pub async fn stream_generation(
        &self,
        request: GenerationRequest,
        request_id: String,
    ) -> Result<ChunkStream, RelayError> {
        let result = self.backend.generate_stream(&request).await;
        self.metrics.record("generate", &result);
        let body = result?;

        info!(request_id, model = %request.model, "Streaming generation");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let pump = StreamPump {
            body,
            buffer: ChunkBuffer::new(self.chunk_size),
            tx,
            idle_timeout: self.stream_idle_timeout,
            metrics: self.metrics.clone(),
            request_id,
        };
        tokio::spawn(pump.run());

        Ok(ReceiverStream::new(rx))
    }

    /// The backend's model catalog, verbatim.
    pub async fn list_models(&self) -> Result<Vec<serde_json::Value>, RelayError> {
        let result = self.backend.list_models().await;
        self.metrics.record("list_models", &result);
        Ok(result?)
    }

    /// Pull a model on the backend and return a confirmation message.
    pub async fn download_model(&self, name: &str) -> Result<String, RelayError> {
        info!(model = name, "Pulling model");
        let result = self.backend.pull_model(name).await;
        self.metrics.record("download_model", &result);
        result?;
        Ok(format!("Model {name} downloaded successfully"))
    }

    pub async fn start_conversation(&self, id: &str) -> Result<String, RelayError> {
        let result = self.conversations.start(id).await;
        self.metrics.record("start_conversation", &result);
        result?;
        self.metrics.conversations.inc();
        debug!(conv_id = id, "Conversation started");
        Ok(format!("Conversation {id} started"))
    }

    /// One turn: record the user message, ask the backend, record the reply.
    ///
    /// Turns on the same id are applied one after the other. Reads of the
    /// conversation are not held up by a turn in progress.
    pub async fn add_message(
        &self,
        id: &str,
        request: GenerationRequest,
    ) -> Result<String, RelayError> {
        let result = self.take_turn(id, request).await;
        self.metrics.record("add_message", &result);
        result
    }

    async fn take_turn(
        &self,
        id: &str,
        request: GenerationRequest,
    ) -> Result<String, RelayError> {
        let turn = self.conversations.begin_turn(id).await?;
        turn.push(Message::user(request.prompt.clone())).await;

        match self.backend.generate(&request).await {
            Ok(text) => {
                turn.push(Message::assistant(text.clone())).await;
                Ok(text)
            }
            Err(e) => {
                if self.rollback_on_failure {
                    turn.pop().await;
                } else {
                    warn!(conv_id = id, "Turn failed; user message left unanswered");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation, RelayError> {
        self.conversations.get(id).await
    }
}

/// Producer half of a streamed generation.
struct StreamPump {
    body: ByteStream,
    buffer: ChunkBuffer,
    tx: mpsc::Sender<String>,
    idle_timeout: Duration,
    metrics: Metrics,
    request_id: String,
}

impl StreamPump {
    async fn run(mut self) {
        let mut chunks = 0usize;
        let mut bytes = 0usize;

        loop {
            let next = match tokio::time::timeout(self.idle_timeout, self.body.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(BackendError::IdleTimeout(self.idle_timeout.as_secs()))),
            };

            match next {
                Some(Ok(piece)) => {
                    if let Some(chunk) = self.buffer.push(&piece) {
                        let len = chunk.len();
                        if !self.send(chunk).await {
                            return;
                        }
                        chunks += 1;
                        bytes += len;
                    }
                }
                Some(Err(e)) => {
                    // The response status is already committed; all we can do
                    // is stop writing.
                    self.metrics.streams_truncated.inc();
                    warn!(
                        request_id = self.request_id,
                        chunks,
                        bytes,
                        error = %e,
                        "Backend stream failed mid-response; truncating"
                    );
                    return;
                }
                None => break,
            }
        }

        if let Some(rest) = self.buffer.finish() {
            let len = rest.len();
            if !self.send(rest).await {
                return;
            }
            chunks += 1;
            bytes += len;
        }

        info!(request_id = self.request_id, chunks, bytes, "Generation stream complete");
    }

    /// Returns false once the client has gone away.
    async fn send(&mut self, chunk: String) -> bool {
        let len = chunk.len() as u64;
        if self.tx.send(chunk).await.is_err() {
            debug!(request_id = self.request_id, "Client disconnected; dropping backend stream");
            return false;
        }
        self.metrics.stream_chunks.inc();
        self.metrics.stream_bytes.inc_by(len);
        true
    }
}
