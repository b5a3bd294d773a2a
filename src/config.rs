//! Runtime configuration for ollama-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every section is optional in the file; missing fields take their defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "ollama-relay", about = "Streaming HTTP relay for a local Ollama server")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address. Overrides `server.listen`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Base URL of the Ollama server. Overrides `backend.base_url`.
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Inference backend configuration.
    pub backend: BackendConfig,

    /// Stream re-chunking settings.
    pub streaming: StreamingConfig,

    /// Conversation history settings.
    pub conversation: ConversationConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Ollama backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Ollama HTTP API.
    pub base_url: String,

    /// Model used when a request does not name one.
    pub default_model: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total timeout for non-streamed calls (generate, tags) in seconds.
    pub request_timeout_secs: u64,

    /// Total timeout for model pulls in seconds.
    pub pull_timeout_secs: u64,

    /// Maximum silence between two reads of a streamed body, in seconds.
    pub stream_idle_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama2".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 300,
            pull_timeout_secs: 3600,
            stream_idle_timeout_secs: 120,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

/// Stream re-chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Emit a chunk once this many UTF-8 bytes have accumulated.
    pub chunk_size: usize,

    /// Chunks buffered between the backend reader and the client writer.
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            channel_capacity: 16,
        }
    }
}

/// Conversation history settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Remove the user message again when the backend call for its turn fails.
    pub rollback_on_failure: bool,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(url) = &cli.backend_url {
            self.backend.base_url = url.clone();
        }
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.streaming.chunk_size == 0 {
            bail!("streaming.chunk_size must be greater than zero");
        }
        if self.streaming.channel_capacity == 0 {
            bail!("streaming.channel_capacity must be greater than zero");
        }
        if self.backend.base_url.trim().is_empty() {
            bail!("backend.base_url must not be empty");
        }
        let timeouts = [
            ("backend.connect_timeout_secs", self.backend.connect_timeout_secs),
            ("backend.request_timeout_secs", self.backend.request_timeout_secs),
            ("backend.pull_timeout_secs", self.backend.pull_timeout_secs),
            ("backend.stream_idle_timeout_secs", self.backend.stream_idle_timeout_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }
}
