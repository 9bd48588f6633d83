//! Centralized error types for the Aulos core library.
//!
//! The taxonomy follows the recovery behavior, not the module layout:
//! - [`TransportError`] — malformed wire data; aborts the session, never retried
//! - [`DecodeError`] — bad codec bytes; recovered locally by discarding the batch
//! - [`PlayerError`] — everything surfaced to the caller, including the fatal
//!   buffering-stalled condition

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for event payloads.
    fn code(&self) -> &'static str;
}

/// Errors in the outer wire framing. All of these are terminal for the
/// session: a framing error means the byte stream can no longer be trusted.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The flag byte was neither a data frame nor the end signal.
    #[error("unknown wire flag 0x{0:02x}")]
    UnknownFlag(u8),

    /// The length field exceeded the sanity bound.
    #[error("wire payload length {0} exceeds maximum")]
    PayloadTooLarge(u32),

    /// A data payload was too short to carry its sequence prefix.
    #[error("wire payload of {0} bytes cannot hold a sequence number")]
    PayloadTruncated(usize),

    /// The stream request could not be encoded or decoded.
    #[error("request codec failed: {0}")]
    Request(#[from] serde_json::Error),

    /// The underlying network read failed.
    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownFlag(_) => "wire_unknown_flag",
            Self::PayloadTooLarge(_) => "wire_payload_too_large",
            Self::PayloadTruncated(_) => "wire_payload_truncated",
            Self::Request(_) => "wire_bad_request",
            Self::Io(_) => "wire_io",
        }
    }
}

/// Errors from the external decode capability.
///
/// Decode failures are recovered locally: the buffer controller discards
/// the offending batch and continues with the next one.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder rejected the bytes as malformed.
    #[error("malformed codec data: {0}")]
    Malformed(String),

    /// The decoded audio did not match the session's format.
    #[error("unexpected decoded format: {0}")]
    Format(String),
}

/// Errors from the external output capability.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The requested start offset lies outside the segment.
    #[error("schedule offset {offset}s outside segment of {duration}s")]
    OffsetOutOfRange { offset: f64, duration: f64 },

    /// The output device rejected the segment.
    #[error("output device error: {0}")]
    Device(String),
}

/// Application-wide error type surfaced to the caller.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum PlayerError {
    /// The wire stream was malformed; the session has been aborted.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The reassembly queue stayed empty past the retry budget.
    /// Buffering has halted; playback may continue until the buffer runs dry.
    #[error("buffering stalled after {0} consecutive empty dequeues")]
    BufferingStalled(u32),

    /// The track could not be loaded at all (request failed, no first chunk).
    #[error("track load failed: {0}")]
    TrackLoad(String),

    /// Transport control was used in a state that cannot honor it.
    #[error("invalid transport operation: {0}")]
    InvalidTransport(String),

    /// Internal invariant violation (worker gone, channel closed early).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlayerError {
    /// Returns a machine-readable error code for event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_failed",
            Self::BufferingStalled(_) => "buffering_stalled",
            Self::TrackLoad(_) => "track_load_failed",
            Self::InvalidTransport(_) => "invalid_transport",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<TransportError> for PlayerError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Convenient Result alias for application-wide operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Result alias for wire-level operations.
pub type TransportResult<T> = Result<T, TransportError>;
