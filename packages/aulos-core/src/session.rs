//! Per-track stream session state.
//!
//! One [`StreamSession`] exists per requested track. It carries the track
//! metadata, the completion tolerance, and the demultiplexer-side sequence
//! tracking. Buffering progress lives with the buffer controller, transport
//! state with the transport task; the session never aggregates either.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PlayerError, PlayerResult};
use crate::protocol_constants::{DEFAULT_COMPLETION_TOLERANCE_SECS, FIRST_SEQUENCE};

/// Caller-supplied description of the track about to stream.
///
/// `duration` seeds the completion check; without it the buffer controller
/// could never decide that the buffer is full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Server-side file name or path of the encoded track.
    pub path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Track duration in seconds.
    pub duration: f64,
}

impl TrackMetadata {
    /// Rejects metadata that cannot seed a playable session.
    pub fn validate(&self) -> PlayerResult<()> {
        if self.path.is_empty() {
            return Err(PlayerError::TrackLoad("track path is empty".to_string()));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(PlayerError::TrackLoad(format!(
                "track duration {} is not a positive number of seconds",
                self.duration
            )));
        }
        Ok(())
    }
}

/// State for one streaming session, created per track request and
/// destroyed on the next request or an explicit stop.
#[derive(Debug)]
pub struct StreamSession {
    id: String,
    metadata: TrackMetadata,
    completion_tolerance_secs: f64,
    next_expected_sequence: u64,
}

impl StreamSession {
    /// Creates a session for `metadata`, validating it first.
    pub fn new(metadata: TrackMetadata, completion_tolerance_secs: f64) -> PlayerResult<Self> {
        metadata.validate()?;
        let id = Uuid::new_v4().to_string();
        log::info!(
            "[Session] Created session {} for '{}' ({:.1}s)",
            id,
            metadata.path,
            metadata.duration
        );
        Ok(Self {
            id,
            metadata,
            completion_tolerance_secs,
            next_expected_sequence: FIRST_SEQUENCE,
        })
    }

    /// Creates a session with the default completion tolerance.
    pub fn with_default_tolerance(metadata: TrackMetadata) -> PlayerResult<Self> {
        Self::new(metadata, DEFAULT_COMPLETION_TOLERANCE_SECS)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    /// Track duration in seconds, the completion target.
    #[must_use]
    pub fn track_duration(&self) -> f64 {
        self.metadata.duration
    }

    #[must_use]
    pub fn completion_tolerance_secs(&self) -> f64 {
        self.completion_tolerance_secs
    }

    /// The sequence number the demultiplexer expects next.
    #[must_use]
    pub fn next_expected_sequence(&self) -> u64 {
        self.next_expected_sequence
    }

    /// Records an arrived chunk sequence. Returns whether it was the one
    /// expected. Arrival order is informational only — the reassembly queue
    /// restores processing order downstream — but a gap here usually means
    /// the sender skipped a chunk, which is worth a log line.
    pub fn observe_sequence(&mut self, sequence: u64) -> bool {
        let in_order = sequence == self.next_expected_sequence;
        if !in_order {
            log::warn!(
                "[Session] Chunk sequence {} arrived, expected {}",
                sequence,
                self.next_expected_sequence
            );
        }
        self.next_expected_sequence = self.next_expected_sequence.max(sequence + 1);
        in_order
    }
}
