//! Engine configuration.
//!
//! Groups the tunable buffering parameters. Protocol-fixed values
//! (header sizes, sync patterns) live in [`crate::protocol_constants`]
//! and are not configurable.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_COMPLETION_TOLERANCE_SECS, DEQUEUE_POLL_INTERVAL_MS, DEQUEUE_RETRY_CAP,
    FILL_INTERVAL_MS, MIN_BATCH_FRAMES,
};

/// Configuration for the adaptive buffer controller.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BufferConfig {
    /// Slack between buffered and track duration at which the buffer
    /// counts as complete (seconds).
    pub completion_tolerance_secs: f64,

    /// Consecutive empty dequeues before buffering is declared stalled.
    pub dequeue_retry_cap: u32,

    /// Minimum reassembled frames batched per decode call.
    pub min_batch_frames: usize,

    /// Interval between buffer fill passes (milliseconds).
    pub fill_interval_ms: u64,

    /// Interval between dequeue polls while collecting a batch (milliseconds).
    pub dequeue_poll_interval_ms: u64,
}

impl BufferConfig {
    /// Creates a new `BufferConfig` with validated values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value would cause runtime issues.
    pub fn new(
        completion_tolerance_secs: f64,
        dequeue_retry_cap: u32,
        min_batch_frames: usize,
        fill_interval_ms: u64,
        dequeue_poll_interval_ms: u64,
    ) -> Result<Self, String> {
        let config = Self {
            completion_tolerance_secs,
            dequeue_retry_cap,
            min_batch_frames,
            fill_interval_ms,
            dequeue_poll_interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.completion_tolerance_secs.is_finite() || self.completion_tolerance_secs < 0.0 {
            return Err("completion_tolerance_secs must be finite and >= 0".to_string());
        }
        if self.dequeue_retry_cap == 0 {
            return Err("dequeue_retry_cap must be >= 1".to_string());
        }
        if self.min_batch_frames == 0 {
            return Err("min_batch_frames must be >= 1".to_string());
        }
        if self.fill_interval_ms == 0 {
            return Err("fill_interval_ms must be >= 1".to_string());
        }
        if self.dequeue_poll_interval_ms == 0 {
            return Err("dequeue_poll_interval_ms must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            completion_tolerance_secs: DEFAULT_COMPLETION_TOLERANCE_SECS,
            dequeue_retry_cap: DEQUEUE_RETRY_CAP,
            min_batch_frames: MIN_BATCH_FRAMES,
            fill_interval_ms: FILL_INTERVAL_MS,
            dequeue_poll_interval_ms: DEQUEUE_POLL_INTERVAL_MS,
        }
    }
}
