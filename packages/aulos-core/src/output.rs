//! Seams to the external decode and output capabilities.
//!
//! The engine never decodes or plays audio itself. The buffer controller
//! hands concatenated codec frames to an [`AudioDecoder`]; the transport
//! schedules decoded regions through an [`AudioOutput`]. Both are traits so
//! tests and headless binaries can substitute their own implementations.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::buffer::AudioSegment;
use crate::error::{DecodeError, OutputError};

/// Decodes concatenated codec frames into timed audio.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decodes `data` (one or more whole codec frames) into a segment.
    /// A [`DecodeError`] means the batch is discarded, never retried.
    async fn decode(&self, data: Bytes) -> Result<AudioSegment, DecodeError>;
}

/// How a scheduled segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The segment played through to its end.
    Finished,
    /// The segment was stopped before its end (pause, seek, stop).
    Stopped,
}

/// Control handle for one in-flight scheduled segment.
pub trait PlaybackHandle: Send {
    /// Stops output of this segment immediately. The completion channel
    /// then resolves with [`SegmentEnd::Stopped`].
    fn stop(&self);
}

/// One scheduled segment: its control handle and its completion signal.
pub struct Scheduled {
    pub handle: Box<dyn PlaybackHandle>,
    /// Resolves exactly once when the segment finishes or is stopped.
    /// An `Err` from the receiver means the output dropped the segment
    /// without reporting; the transport treats that as stopped.
    pub completion: oneshot::Receiver<SegmentEnd>,
}

impl std::fmt::Debug for Scheduled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduled").finish_non_exhaustive()
    }
}

/// Schedules decoded audio for audible playback.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Starts playing `segment` from `start_offset_secs` into it.
    ///
    /// Fails with [`OutputError::OffsetOutOfRange`] when the offset lies
    /// at or past the segment's end.
    async fn schedule(
        &self,
        segment: AudioSegment,
        start_offset_secs: f64,
    ) -> Result<Scheduled, OutputError>;

    /// Applies a new volume (0.0 to 1.0) to the active output path
    /// without interrupting playback.
    fn set_volume(&self, volume: f64);
}
