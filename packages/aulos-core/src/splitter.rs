//! Cutting the chunk stream into header-delimited codec frames.
//!
//! Chunk boundaries are arbitrary: a codec frame routinely starts in one
//! chunk and ends several chunks later, and a sync word itself can be split
//! across a chunk boundary. [`FrameSplitter`] carries the incomplete tail
//! forward and emits a frame only once the next boundary proves where it
//! ends.
//!
//! Emission policy: at most one frame per chunk, strictly forward progress.
//! Bytes between two boundary detections travel as a single
//! [`ReassembledFrame`] even when they contain several codec frames — the
//! decoder accepts concatenated frames, and re-scanning confirmed interiors
//! would make the splitter quadratic on large frames.

use bytes::{Bytes, BytesMut};

use crate::adts::AdtsProfile;
use crate::wire::Chunk;

/// One or more concatenated codec frames spanning exactly the region
/// between two boundary detections, tagged with the sequence of the chunk
/// that completed the region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledFrame {
    pub sequence: u64,
    pub data: Bytes,
}

impl ReassembledFrame {
    /// Byte length of the frame region.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame region is empty (never produced by the splitter).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Stateful splitter turning chunks into [`ReassembledFrame`]s.
///
/// Internal state:
/// - `working` — bytes from the last confirmed boundary onward; grows until
///   the next boundary completes it
/// - `deferred` — bytes not yet scanned successfully; prepended to the next
///   chunk so a boundary split across chunks is still found
#[derive(Debug)]
pub struct FrameSplitter {
    profile: AdtsProfile,
    working: BytesMut,
    deferred: BytesMut,
    last_sequence: u64,
}

impl FrameSplitter {
    /// Creates a splitter validating boundaries against `profile`.
    #[must_use]
    pub fn new(profile: AdtsProfile) -> Self {
        Self {
            profile,
            working: BytesMut::new(),
            deferred: BytesMut::new(),
            last_sequence: 0,
        }
    }

    /// Feeds one chunk, returning the frame it completed, if any.
    pub fn split(&mut self, chunk: &Chunk) -> Option<ReassembledFrame> {
        self.last_sequence = chunk.sequence;

        // Prepend previously unscanned bytes so a boundary split across
        // chunk edges is seen once the window contains it whole.
        let mut combined = std::mem::take(&mut self.deferred);
        combined.extend_from_slice(&chunk.data);

        match self.profile.find_frame_start(&combined) {
            Some(i) if i > 0 && !self.working.is_empty() => {
                // The bytes before the boundary complete the working frame.
                let mut frame = std::mem::take(&mut self.working);
                frame.extend_from_slice(&combined[..i]);
                self.working = combined.split_off(i);
                Some(ReassembledFrame {
                    sequence: chunk.sequence,
                    data: frame.freeze(),
                })
            }
            Some(0) if !self.working.is_empty() => {
                // Boundary right at the front: the pending frame is whole.
                let frame = std::mem::take(&mut self.working);
                self.working = combined;
                Some(ReassembledFrame {
                    sequence: chunk.sequence,
                    data: frame.freeze(),
                })
            }
            Some(i) => {
                // First boundary of the session. Bytes before it belong to
                // no frame (mid-stream join) and are dropped.
                if i > 0 {
                    log::debug!("[Splitter] Discarding {} pre-sync bytes", i);
                }
                self.working = combined.split_off(i);
                None
            }
            None => {
                // No boundary in the window; defer everything for rescan.
                self.deferred = combined;
                None
            }
        }
    }

    /// Emits the pending tail as the final frame. Called on the stream's
    /// explicit end signal; without it the last codec frame would be lost
    /// because no further boundary will ever confirm it.
    pub fn flush(&mut self) -> Option<ReassembledFrame> {
        let mut frame = std::mem::take(&mut self.working);
        frame.extend_from_slice(&self.deferred);
        self.deferred.clear();
        if frame.is_empty() {
            return None;
        }
        Some(ReassembledFrame {
            sequence: self.last_sequence,
            data: frame.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adts::test_support::make_frame;

    fn chunk(sequence: u64, data: &[u8]) -> Chunk {
        Chunk {
            sequence,
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Runs `stream` through a fresh splitter with the given chunk sizes and
    /// returns the concatenation of every emitted frame (flush included).
    fn reassemble(stream: &[u8], chunk_sizes: &[usize]) -> Vec<u8> {
        let mut splitter = FrameSplitter::new(AdtsProfile::default());
        let mut out = Vec::new();
        let mut offset = 0;
        let mut sequence = 1;
        for &size in chunk_sizes {
            let end = (offset + size).min(stream.len());
            if let Some(frame) = splitter.split(&chunk(sequence, &stream[offset..end])) {
                out.extend_from_slice(&frame.data);
            }
            offset = end;
            sequence += 1;
        }
        assert_eq!(offset, stream.len(), "chunk sizes must cover the stream");
        if let Some(frame) = splitter.flush() {
            out.extend_from_slice(&frame.data);
        }
        out
    }

    fn frame_stream(payload_lens: &[usize]) -> Vec<u8> {
        let profile = AdtsProfile::default();
        payload_lens
            .iter()
            .flat_map(|&len| make_frame(&profile, len))
            .collect()
    }

    #[test]
    fn chunk_boundaries_do_not_change_reassembled_bytes() {
        let stream = frame_stream(&[40, 25, 33, 18, 52]);
        let whole = reassemble(&stream, &[stream.len()]);
        assert_eq!(whole, stream);

        // A spread of pathological chunkings, including 1-byte trickle.
        let chunkings: Vec<Vec<usize>> = vec![
            vec![1; stream.len()],
            vec![3; stream.len().div_ceil(3)],
            vec![7, 1, 64, 2, 128, stream.len()],
            vec![stream.len() / 2, stream.len()],
        ];
        for sizes in chunkings {
            assert_eq!(
                reassemble(&stream, &sizes),
                whole,
                "reassembly must be chunk-boundary independent"
            );
        }
    }

    #[test]
    fn sync_word_split_between_its_two_bytes_is_found_after_join() {
        let profile = AdtsProfile::default();
        let mut splitter = FrameSplitter::new(profile);

        let first = make_frame(&profile, 30);
        let second = make_frame(&profile, 22);

        // First frame arrives whole; nothing emitted yet (no closing boundary).
        assert!(splitter.split(&chunk(1, &first)).is_none());

        // Second frame split exactly between sync byte 0 and byte 1.
        assert!(splitter.split(&chunk(2, &second[..1])).is_none());
        let frame = splitter
            .split(&chunk(3, &second[1..]))
            .expect("joined sync word must close the first frame");
        assert_eq!(&frame.data[..], &first[..]);
        assert_eq!(frame.sequence, 3);

        // Flush releases the second frame intact.
        let tail = splitter.flush().expect("tail frame pending");
        assert_eq!(&tail.data[..], &second[..]);
    }

    #[test]
    fn emits_at_most_one_frame_per_chunk() {
        let profile = AdtsProfile::default();
        let mut splitter = FrameSplitter::new(profile);

        // One chunk carrying three whole frames plus the start of a fourth.
        let mut data = frame_stream(&[10, 12, 14]);
        let fourth = make_frame(&profile, 16);
        data.extend_from_slice(&fourth[..3]);

        // Only one boundary decision per chunk: the first scan hits offset 0
        // and starts the working frame; nothing is emitted.
        assert!(splitter.split(&chunk(1, &data)).is_none());

        // The rest of the fourth frame closes nothing (its boundary was
        // already consumed), still at most one emission.
        let emitted = splitter.split(&chunk(2, &fourth[3..]));
        assert!(emitted.is_none());

        // Flush returns everything as a single multi-frame region.
        let tail = splitter.flush().expect("pending region");
        let mut expected = data.clone();
        expected.extend_from_slice(&fourth[3..]);
        assert_eq!(&tail.data[..], &expected[..]);
    }

    #[test]
    fn boundary_at_front_releases_pending_frame_whole() {
        let profile = AdtsProfile::default();
        let mut splitter = FrameSplitter::new(profile);

        let first = make_frame(&profile, 20);
        let second = make_frame(&profile, 28);

        assert!(splitter.split(&chunk(1, &first)).is_none());
        let frame = splitter
            .split(&chunk(2, &second))
            .expect("front boundary releases the pending frame");
        assert_eq!(&frame.data[..], &first[..]);
        assert_eq!(frame.sequence, 2);
    }

    #[test]
    fn discards_pre_sync_noise_before_first_frame() {
        let profile = AdtsProfile::default();
        let mut splitter = FrameSplitter::new(profile);

        let frame = make_frame(&profile, 24);
        let mut data = vec![0x13, 0x37, 0x00];
        data.extend_from_slice(&frame);

        assert!(splitter.split(&chunk(1, &data)).is_none());
        let tail = splitter.flush().expect("frame pending");
        assert_eq!(&tail.data[..], &frame[..], "noise must not reach the frame");
    }
}
