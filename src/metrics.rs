//! Prometheus metrics for the relay.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Counters and gauges owned by one relay instance.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    pub stream_chunks: IntCounter,
    pub stream_bytes: IntCounter,
    pub streams_truncated: IntCounter,
    pub conversations: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("relay_requests_total", "Relay operations by outcome"),
            &["operation", "outcome"],
        )?;
        let stream_chunks = IntCounter::new(
            "relay_stream_chunks_total",
            "Chunks written to streaming clients",
        )?;
        let stream_bytes = IntCounter::new(
            "relay_stream_bytes_total",
            "UTF-8 bytes written to streaming clients",
        )?;
        let streams_truncated = IntCounter::new(
            "relay_streams_truncated_total",
            "Streams cut short by a backend failure after the response started",
        )?;
        let conversations = IntGauge::new("relay_conversations", "Conversations in memory")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(stream_chunks.clone()))?;
        registry.register(Box::new(stream_bytes.clone()))?;
        registry.register(Box::new(streams_truncated.clone()))?;
        registry.register(Box::new(conversations.clone()))?;

        Ok(Self {
            registry,
            requests,
            stream_chunks,
            stream_bytes,
            streams_truncated,
            conversations,
        })
    }

    /// Count one finished operation.
    pub fn record<T, E>(&self, operation: &str, result: &Result<T, E>) {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        self.requests.with_label_values(&[operation, outcome]).inc();
    }

    pub fn request_count(&self, operation: &str, outcome: &str) -> u64 {
        self.requests.with_label_values(&[operation, outcome]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("Failed to encode metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
