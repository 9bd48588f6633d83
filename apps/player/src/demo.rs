//! Device-free decode and output implementations.
//!
//! `play` exercises the full pipeline without an audio device:
//! [`PassthroughDecoder`] derives timing from the ADTS headers instead of
//! decompressing anything, and [`ClockOutput`] consumes wall-clock time per
//! scheduled segment. Wire both into the engine and a track "plays" for
//! exactly its real duration, silently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aulos_core::{
    AdtsHeader, AdtsProfile, AudioDecoder, AudioOutput, AudioSegment, DecodeError, OutputError,
    PlaybackHandle, Scheduled, SegmentEnd,
};
use bytes::Bytes;
use parking_lot::Mutex;
use aulos_core::protocol_constants::AAC_SAMPLES_PER_FRAME;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Decoder that walks ADTS headers and synthesizes silence of the right
/// length: frame count times 1024 samples at the profile's rate.
pub struct PassthroughDecoder {
    profile: AdtsProfile,
    sample_rate: u32,
}

impl PassthroughDecoder {
    pub fn new(profile: AdtsProfile) -> anyhow::Result<Self> {
        let sample_rate = profile
            .sample_rate_hz()
            .ok_or_else(|| anyhow::anyhow!("profile uses a reserved sampling frequency index"))?;
        Ok(Self {
            profile,
            sample_rate,
        })
    }

    /// Counts whole frames in `data`, rejecting anything that is not a
    /// run of valid frames for this profile.
    fn count_frames(&self, data: &[u8]) -> Result<usize, DecodeError> {
        let mut frames = 0usize;
        let mut offset = 0usize;
        while offset < data.len() {
            let header = AdtsHeader::parse(&data[offset..])
                .filter(|h| self.profile.accepts(h))
                .ok_or_else(|| {
                    DecodeError::Malformed(format!("no valid frame header at byte {offset}"))
                })?;
            let frame_length = header.frame_length as usize;
            if frame_length < 7 {
                return Err(DecodeError::Malformed(format!(
                    "frame at byte {offset} declares impossible length {frame_length}"
                )));
            }
            if offset + frame_length > data.len() {
                return Err(DecodeError::Malformed(format!(
                    "frame at byte {offset} runs past the batch end"
                )));
            }
            offset += frame_length;
            frames += 1;
        }
        Ok(frames)
    }
}

#[async_trait]
impl AudioDecoder for PassthroughDecoder {
    async fn decode(&self, data: Bytes) -> Result<AudioSegment, DecodeError> {
        let frames = self.count_frames(&data)?;
        let samples = frames * AAC_SAMPLES_PER_FRAME as usize;
        let channels = usize::from(self.profile.channel_configuration.max(1));
        Ok(AudioSegment::new(
            self.sample_rate,
            vec![vec![0.0f32; samples]; channels],
        ))
    }
}

struct ClockHandle {
    cancel: CancellationToken,
}

impl PlaybackHandle for ClockHandle {
    fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Output that "plays" a segment by sleeping through its duration.
pub struct ClockOutput {
    volume: Mutex<f64>,
}

impl ClockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            volume: Mutex::new(1.0),
        })
    }
}

#[async_trait]
impl AudioOutput for ClockOutput {
    async fn schedule(
        &self,
        segment: AudioSegment,
        start_offset_secs: f64,
    ) -> Result<Scheduled, OutputError> {
        let duration = segment.duration_secs();
        if start_offset_secs < 0.0 || start_offset_secs >= duration {
            return Err(OutputError::OffsetOutOfRange {
                offset: start_offset_secs,
                duration,
            });
        }
        let remaining = Duration::from_secs_f64(duration - start_offset_secs);
        log::debug!("[ClockOutput] Playing {:.2}s of silence", remaining.as_secs_f64());

        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let child = cancel.clone();
        tokio::spawn(async move {
            let end = tokio::select! {
                biased;
                _ = child.cancelled() => SegmentEnd::Stopped,
                _ = tokio::time::sleep(remaining) => SegmentEnd::Finished,
            };
            let _ = tx.send(end);
        });

        Ok(Scheduled {
            handle: Box::new(ClockHandle { cancel }),
            completion: rx,
        })
    }

    fn set_volume(&self, volume: f64) {
        *self.volume.lock() = volume;
        log::info!("[ClockOutput] Volume set to {:.2}", volume);
    }
}
