//! Decoded audio storage: timed segments and the append-only playback buffer.
//!
//! The buffer controller exclusively owns the [`PlaybackBuffer`] and is the
//! only writer. The transport reads through a [`BufferReader`], which also
//! carries a watch channel so "wait until something is buffered" is a real
//! await, not a poll.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

/// Decoded, timed audio: planar samples, one `Vec<f32>` per channel.
///
/// Duration is derived from the shortest channel, so a segment whose
/// channels disagree in length never overstates what is playable.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioSegment {
    /// Creates a segment from planar channel data.
    #[must_use]
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// An empty segment with no channels yet. The first append decides
    /// the channel count.
    #[must_use]
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(sample_rate, Vec::new())
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Playable samples per channel: the shortest channel wins.
    #[must_use]
    pub fn len_samples(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Playable seconds in this segment.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len_samples() as f64 / f64::from(self.sample_rate)
    }

    /// Read access to one channel's samples.
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Appends `other` in time. When the channel counts differ, only the
    /// smaller count is kept on both sides; joining mismatched layouts
    /// must never index past the narrower buffer.
    pub fn append(&mut self, other: &AudioSegment) {
        if other.channels.is_empty() {
            return;
        }
        if self.channels.is_empty() {
            self.channels = other.channels.clone();
            return;
        }
        let keep = self.channels.len().min(other.channels.len());
        self.channels.truncate(keep);
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst.extend_from_slice(src);
        }
    }

    /// Copies out the region from `start_secs` to the current end.
    /// Returns `None` when `start_secs` is at or past the end.
    #[must_use]
    pub fn region_from(&self, start_secs: f64) -> Option<AudioSegment> {
        if self.sample_rate == 0 {
            return None;
        }
        let start = (start_secs.max(0.0) * f64::from(self.sample_rate)) as usize;
        let len = self.len_samples();
        if start >= len {
            return None;
        }
        let channels = self
            .channels
            .iter()
            .map(|ch| ch[start..len].to_vec())
            .collect();
        Some(AudioSegment::new(self.sample_rate, channels))
    }
}

/// Shared state behind the buffer handles.
struct BufferInner {
    segment: RwLock<AudioSegment>,
}

/// The append-only decoded-audio buffer. Grows monotonically; the only way
/// audio is ever discarded is dropping the buffer on session teardown.
pub struct PlaybackBuffer {
    inner: Arc<BufferInner>,
    duration_tx: watch::Sender<f64>,
}

impl PlaybackBuffer {
    /// Creates an empty buffer for the given output sample rate.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        let inner = Arc::new(BufferInner {
            segment: RwLock::new(AudioSegment::empty(sample_rate)),
        });
        let (duration_tx, _) = watch::channel(0.0);
        Self { inner, duration_tx }
    }

    /// Appends decoded audio and publishes the new buffered duration.
    pub fn append(&self, segment: &AudioSegment) {
        let duration = {
            let mut guard = self.inner.segment.write();
            guard.append(segment);
            guard.duration_secs()
        };
        // send_replace never fails; a watch sender outlives its receivers.
        self.duration_tx.send_replace(duration);
    }

    /// Seconds of playable audio currently held.
    #[must_use]
    pub fn buffered_duration(&self) -> f64 {
        *self.duration_tx.borrow()
    }

    /// A read-only handle for the transport.
    #[must_use]
    pub fn reader(&self) -> BufferReader {
        BufferReader {
            inner: Arc::clone(&self.inner),
            duration_rx: self.duration_tx.subscribe(),
        }
    }
}

/// Read-only view of the playback buffer plus its duration watch.
#[derive(Clone)]
pub struct BufferReader {
    inner: Arc<BufferInner>,
    duration_rx: watch::Receiver<f64>,
}

impl BufferReader {
    /// Seconds of playable audio currently held.
    #[must_use]
    pub fn buffered_duration(&self) -> f64 {
        *self.duration_rx.borrow()
    }

    /// Copies out the contiguous region from `start_secs` to the buffered
    /// end, or `None` when nothing is buffered past `start_secs`.
    #[must_use]
    pub fn region_from(&self, start_secs: f64) -> Option<AudioSegment> {
        self.inner.segment.read().region_from(start_secs)
    }

    /// Waits until the buffered duration exceeds `threshold_secs`.
    /// Returns the duration that satisfied the wait, or `None` if the
    /// writing side went away first.
    pub async fn wait_for_duration_above(&mut self, threshold_secs: f64) -> Option<f64> {
        loop {
            let current = *self.duration_rx.borrow_and_update();
            if current > threshold_secs {
                return Some(current);
            }
            if self.duration_rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
