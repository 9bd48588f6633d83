//! Engine events and the emitter seam.
//!
//! Components emit through the [`EventEmitter`] trait rather than a concrete
//! channel, so a binary can forward events anywhere (or nowhere) without the
//! engine knowing. Timestamps are unix milliseconds, taken at emission.

use serde::Serialize;

use crate::error::PlayerError;

/// Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Every event the engine can emit, grouped by domain.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// Stream session lifecycle.
    Stream(StreamEvent),
    /// Buffering progress and faults.
    Buffer(BufferEvent),
    /// Transport state transitions.
    Transport(TransportEvent),
}

/// Stream session lifecycle events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A new stream session was opened.
    Started {
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Server-side path of the track being streamed.
        path: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The sender signalled end-of-stream; all chunks have arrived.
    Ended {
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Total chunks received over the session.
        chunks: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session failed and was torn down.
    Failed {
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Machine-readable error code.
        code: String,
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Buffering progress events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BufferEvent {
    /// Buffered duration grew.
    Progress {
        /// Seconds of decoded audio now buffered.
        #[serde(rename = "bufferedSecs")]
        buffered_secs: f64,
        /// The track's total duration in seconds.
        #[serde(rename = "trackSecs")]
        track_secs: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The buffer reached the completion threshold; filling has stopped.
    Complete {
        #[serde(rename = "bufferedSecs")]
        buffered_secs: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The ordered queue stayed empty past the retry budget. Fatal for
    /// buffering; playback may continue on what is already buffered.
    Stalled {
        /// Consecutive empty dequeues observed.
        retries: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Transport state transition events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    /// Playback started or resumed.
    Playing {
        /// Elapsed position in seconds playback proceeds from.
        elapsed: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Playback paused; `elapsed` records the pause point.
    Paused {
        elapsed: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The playhead jumped to a new position.
    Seeked {
        /// The new elapsed position in seconds.
        elapsed: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Playback reached the end of buffered audio while more is expected;
    /// the transport is waiting for the buffer to grow.
    Underrun {
        elapsed: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Playback was stopped and the session torn down.
    Stopped {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Volume changed.
    VolumeChanged {
        volume: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<StreamEvent> for PlayerEvent {
    fn from(event: StreamEvent) -> Self {
        PlayerEvent::Stream(event)
    }
}

impl From<BufferEvent> for PlayerEvent {
    fn from(event: BufferEvent) -> Self {
        PlayerEvent::Buffer(event)
    }
}

impl From<TransportEvent> for PlayerEvent {
    fn from(event: TransportEvent) -> Self {
        PlayerEvent::Transport(event)
    }
}

impl StreamEvent {
    /// Builds the failure event for a session-fatal error.
    #[must_use]
    pub fn failed(session_id: &str, error: &PlayerError) -> Self {
        Self::Failed {
            session_id: session_id.to_string(),
            code: error.code().to_string(),
            error: error.to_string(),
            timestamp: now_millis(),
        }
    }
}

/// Trait for emitting engine events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a stream session lifecycle event.
    fn emit_stream(&self, event: StreamEvent);

    /// Emits a buffering progress event.
    fn emit_buffer(&self, event: BufferEvent);

    /// Emits a transport transition event.
    fn emit_transport(&self, event: TransportEvent);
}

/// No-op emitter for headless use or testing. Events are discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_stream(&self, _event: StreamEvent) {
        // No-op
    }

    fn emit_buffer(&self, _event: BufferEvent) {
        // No-op
    }

    fn emit_transport(&self, _event: TransportEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development. Logs every event at
/// debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_stream(&self, event: StreamEvent) {
        tracing::debug!(?event, "stream_event");
    }

    fn emit_buffer(&self, event: BufferEvent) {
        tracing::debug!(?event, "buffer_event");
    }

    fn emit_transport(&self, event: TransportEvent) {
        tracing::debug!(?event, "transport_event");
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingEventEmitter;
    use super::*;

    #[test]
    fn recording_emitter_captures_by_category() {
        let emitter = RecordingEventEmitter::new();
        emitter.emit_buffer(BufferEvent::Stalled {
            retries: 100,
            timestamp: 0,
        });
        emitter.emit_transport(TransportEvent::Playing {
            elapsed: 0.0,
            timestamp: 0,
        });
        assert_eq!(emitter.events.lock().len(), 2);
        assert_eq!(emitter.stalled_count(), 1);
    }

    #[test]
    fn events_serialize_with_category_and_type_tags() {
        let event = PlayerEvent::Buffer(BufferEvent::Progress {
            buffered_secs: 12.5,
            track_secs: 235.0,
            timestamp: 1700000000000,
        });
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["category"], "buffer");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["bufferedSecs"], 12.5);
    }

    #[test]
    fn failed_event_carries_the_error_code() {
        let err = PlayerError::BufferingStalled(100);
        let event = StreamEvent::failed("session-1", &err);
        match event {
            StreamEvent::Failed { code, .. } => assert_eq!(code, "buffering_stalled"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
