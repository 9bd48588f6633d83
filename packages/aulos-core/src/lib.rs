//! Aulos Core - gapless AAC stream reassembly and adaptive buffering.
//!
//! This crate reconstructs a seekable playback timeline from a track
//! delivered as length-prefixed chunks whose boundaries never align with
//! the codec's own frame boundaries. It is the engine behind a streaming
//! player: the player binary supplies the network connection, the decoder,
//! and the output device; this crate does everything in between.
//!
//! # Architecture
//!
//! Data flows one way through the modules:
//!
//! - [`wire`]: strips the outer length-prefixed envelope into chunks
//! - [`adts`]: locates and validates codec frame boundaries
//! - [`splitter`]: cuts the chunk stream into header-delimited frames
//! - [`reorder`]: releases frames in ascending sequence order (own worker)
//! - [`controller`]: batches, decodes, and grows the playback buffer
//! - [`transport`]: play/pause/seek/volume over the buffered audio
//! - [`engine`]: wires a byte stream through all of the above per session
//!
//! # Abstraction Traits
//!
//! Decode and output are external capabilities behind traits:
//!
//! - [`AudioDecoder`](output::AudioDecoder): compressed frames to timed audio
//! - [`AudioOutput`](output::AudioOutput): scheduling audible playback
//! - [`EventEmitter`](events::EventEmitter): delivering engine events
//!
//! Each has implementations suitable for a headless binary; real device
//! integrations live with the embedding application.

#![warn(clippy::all)]

pub mod adts;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod output;
pub mod protocol_constants;
pub mod reorder;
pub mod session;
pub mod splitter;
pub mod transport;
pub mod wire;

// Re-export commonly used types at the crate root
pub use adts::{AdtsHeader, AdtsProfile};
pub use buffer::{AudioSegment, BufferReader, PlaybackBuffer};
pub use config::BufferConfig;
pub use controller::{BufferController, FillOutcome};
pub use engine::StreamEngine;
pub use error::{
    DecodeError, ErrorCode, OutputError, PlayerError, PlayerResult, TransportError,
    TransportResult,
};
pub use events::{
    BufferEvent, EventEmitter, LoggingEventEmitter, NoopEventEmitter, PlayerEvent, StreamEvent,
    TransportEvent, now_millis,
};
pub use output::{AudioDecoder, AudioOutput, PlaybackHandle, Scheduled, SegmentEnd};
pub use reorder::{QueueRequest, QueueResponse, ReorderQueue};
pub use session::{StreamSession, TrackMetadata};
pub use splitter::{FrameSplitter, ReassembledFrame};
pub use transport::{Transport, TransportPhase, TransportStatus};
pub use wire::{Chunk, DemuxEvent, StreamRequest, WireDemux, WireFrame, WireFrameCodec, demux_stream};
