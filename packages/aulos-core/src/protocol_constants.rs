//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (the wire framing,
//! ADTS) or by the buffering contract, and changing them would break
//! interoperability with peers or the documented retry semantics.

// ─────────────────────────────────────────────────────────────────────────────
// Wire Framing
// ─────────────────────────────────────────────────────────────────────────────

/// Size of the wire envelope header: 1 flag byte + 4-byte big-endian length.
pub const WIRE_HEADER_LEN: usize = 5;

/// Flag byte marking an ordinary data frame.
pub const WIRE_FLAG_DATA: u8 = 0x00;

/// Flag byte marking the explicit end-of-stream signal (empty payload).
pub const WIRE_FLAG_END: u8 = 0x80;

/// Size of the sequence prefix inside a data payload (big-endian u64).
pub const WIRE_SEQUENCE_LEN: usize = 8;

/// Maximum accepted payload length.
///
/// The sender chunks files at a few KB; anything near this bound means a
/// corrupted length field, so the demultiplexer aborts instead of
/// allocating.
pub const WIRE_MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Sequence number of the first chunk on a stream session.
pub const FIRST_SEQUENCE: u64 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// ADTS Framing
// ─────────────────────────────────────────────────────────────────────────────

/// First sync byte of an ADTS frame header (all bits set).
pub const ADTS_SYNC_BYTE: u8 = 0xFF;

/// Mask for the sync bits carried in the second header byte (top 4 bits).
pub const ADTS_SYNC_MASK: u8 = 0xF0;

/// Size of the fixed ADTS header region validated by the scanner.
pub const ADTS_HEADER_LEN: usize = 7;

/// Samples per channel carried by one AAC frame.
pub const AAC_SAMPLES_PER_FRAME: u32 = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Buffering Contract
// ─────────────────────────────────────────────────────────────────────────────

/// Consecutive empty dequeues tolerated before buffering is declared stalled.
pub const DEQUEUE_RETRY_CAP: u32 = 100;

/// Minimum number of reassembled frames batched per decode call.
pub const MIN_BATCH_FRAMES: usize = 5;

/// Interval between dequeue polls while collecting a batch (milliseconds).
pub const DEQUEUE_POLL_INTERVAL_MS: u64 = 10;

/// Interval between buffer fill passes (milliseconds).
pub const FILL_INTERVAL_MS: u64 = 250;

/// Default slack between buffered and track duration at which the buffer
/// counts as complete (seconds).
pub const DEFAULT_COMPLETION_TOLERANCE_SECS: f64 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default sample rate for decoded playback audio (Hz).
///
/// 44.1kHz matches the library's encoder profile (CD-derived sources).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
