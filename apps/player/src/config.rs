//! Player configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Player configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Host the stream server binds to / the player connects to.
    /// Override: `AULOS_HOST`
    pub host: String,

    /// TCP port for the chunk stream.
    /// Override: `AULOS_PORT`
    pub port: u16,

    /// Bytes per chunk in serve mode.
    /// Override: `AULOS_CHUNK_SIZE`
    pub chunk_size: usize,

    /// Seconds of slack allowed between buffered and track duration
    /// before the buffer counts as complete.
    pub completion_tolerance_secs: f64,

    /// Consecutive empty dequeues tolerated before buffering is declared
    /// stalled.
    pub dequeue_retry_cap: u32,

    /// Frames collected per decode batch.
    pub min_batch_frames: usize,

    /// Milliseconds between buffer fill passes.
    pub fill_interval_ms: u64,

    /// Milliseconds between dequeue retries inside a fill pass.
    pub dequeue_poll_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let buffer = aulos_core::BufferConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 49600,
            chunk_size: 4096,
            completion_tolerance_secs: buffer.completion_tolerance_secs,
            dequeue_retry_cap: buffer.dequeue_retry_cap,
            min_batch_frames: buffer.min_batch_frames,
            fill_interval_ms: buffer.fill_interval_ms,
            dequeue_poll_interval_ms: buffer.dequeue_poll_interval_ms,
        }
    }
}

impl PlayerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AULOS_HOST") {
            self.host = val;
        }

        if let Ok(val) = std::env::var("AULOS_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }

        if let Ok(val) = std::env::var("AULOS_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                self.chunk_size = size;
            }
        }
    }

    /// Converts to aulos-core's buffering configuration.
    pub fn to_buffer_config(&self) -> Result<aulos_core::BufferConfig> {
        aulos_core::BufferConfig::new(
            self.completion_tolerance_secs,
            self.dequeue_retry_cap,
            self.min_batch_frames,
            self.fill_interval_ms,
            self.dequeue_poll_interval_ms,
        )
        .map_err(|reason| anyhow::anyhow!("Invalid buffering configuration: {reason}"))
    }
}
