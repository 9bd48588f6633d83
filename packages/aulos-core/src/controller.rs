//! Adaptive buffer fill loop.
//!
//! The [`BufferController`] pulls ordered frames from the reassembly queue,
//! batches them, hands each batch to the decode capability, and appends the
//! decoded audio to the playback buffer. It decides three things: when the
//! buffer is complete, when a batch is ready to decode, and when buffering
//! has fatally stalled.
//!
//! The retry budget lives here, not in the queue: the queue stays
//! gap-agnostic, and the controller treats "empty" as "try again later"
//! up to [`BufferConfig::dequeue_retry_cap`] consecutive misses.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferReader, PlaybackBuffer};
use crate::config::BufferConfig;
use crate::error::{PlayerError, PlayerResult};
use crate::events::{BufferEvent, EventEmitter, now_millis};
use crate::output::AudioDecoder;
use crate::reorder::ReorderQueue;

/// Rounds to one decimal place. Completion compares rounded durations so
/// float noise near the threshold cannot make the decision oscillate.
fn round_tenth(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}

/// Outcome of one fill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// A batch was decoded and appended.
    Appended,
    /// A batch was pulled but the decoder rejected it; the batch was
    /// discarded and filling continues.
    Discarded,
    /// The buffer holds enough audio; filling is over for this session.
    Complete,
    /// The retry budget ran out. Fatal for this session's buffering.
    Stalled,
}

/// Pulls ordered frames, decodes in batches, grows the playback buffer.
///
/// Exclusively owns the [`PlaybackBuffer`] and the session's buffering
/// counters. The transport only ever sees a [`BufferReader`].
pub struct BufferController {
    config: BufferConfig,
    queue: ReorderQueue,
    decoder: Arc<dyn AudioDecoder>,
    emitter: Arc<dyn EventEmitter>,
    buffer: PlaybackBuffer,
    track_duration: f64,
    retry_count: u32,
    complete: bool,
    stalled: bool,
}

impl BufferController {
    pub fn new(
        config: BufferConfig,
        queue: ReorderQueue,
        decoder: Arc<dyn AudioDecoder>,
        emitter: Arc<dyn EventEmitter>,
        sample_rate: u32,
        track_duration: f64,
    ) -> Self {
        Self {
            config,
            queue,
            decoder,
            emitter,
            buffer: PlaybackBuffer::new(sample_rate),
            track_duration,
            retry_count: 0,
            complete: false,
            stalled: false,
        }
    }

    /// Read-only view of the playback buffer for the transport.
    #[must_use]
    pub fn reader(&self) -> BufferReader {
        self.buffer.reader()
    }

    /// Seconds of decoded audio currently buffered.
    #[must_use]
    pub fn buffered_duration(&self) -> f64 {
        self.buffer.buffered_duration()
    }

    /// Whether the completion threshold has been reached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// One fill pass: completion check, then batch collection, decode,
    /// append. Returns what happened so the timer loop can decide whether
    /// to keep ticking.
    pub async fn fill(&mut self) -> PlayerResult<FillOutcome> {
        if self.stalled {
            return Ok(FillOutcome::Stalled);
        }
        if self.check_complete() {
            return Ok(FillOutcome::Complete);
        }

        let batch = match self.collect_batch().await? {
            Some(batch) => batch,
            None => {
                // Budget exhausted. Emitted exactly once; later passes
                // short-circuit on the stalled flag.
                self.stalled = true;
                log::error!(
                    "[Controller] Buffering stalled after {} consecutive empty dequeues",
                    self.retry_count
                );
                self.emitter.emit_buffer(BufferEvent::Stalled {
                    retries: self.retry_count,
                    timestamp: now_millis(),
                });
                return Ok(FillOutcome::Stalled);
            }
        };

        match self.decoder.decode(batch.freeze()).await {
            Ok(segment) => {
                self.buffer.append(&segment);
                let buffered = self.buffer.buffered_duration();
                log::debug!(
                    "[Controller] Buffered {:.1}s / {:.1}s",
                    buffered,
                    self.track_duration
                );
                self.emitter.emit_buffer(BufferEvent::Progress {
                    buffered_secs: buffered,
                    track_secs: self.track_duration,
                    timestamp: now_millis(),
                });
                if self.check_complete() {
                    return Ok(FillOutcome::Complete);
                }
                Ok(FillOutcome::Appended)
            }
            Err(err) => {
                // Bad batch: drop it and move on. Retrying the same bytes
                // would fail the same way.
                log::warn!("[Controller] Discarding undecodable batch: {}", err);
                Ok(FillOutcome::Discarded)
            }
        }
    }

    /// Timer-driven fill until complete, stalled, or cancelled.
    pub async fn run(mut self, cancel: CancellationToken) -> PlayerResult<()> {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.fill_interval_ms));
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("[Controller] Fill loop cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            // Cancellation must also interrupt a pass that is mid-poll on
            // an empty queue; dropping the pass is fine, reset discards
            // everything anyway.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("[Controller] Fill loop cancelled");
                    return Ok(());
                }
                outcome = self.fill() => outcome?,
            };
            match outcome {
                FillOutcome::Complete => {
                    log::info!("[Controller] Buffer complete, fill loop done");
                    return Ok(());
                }
                FillOutcome::Stalled => {
                    return Err(PlayerError::BufferingStalled(self.retry_count));
                }
                FillOutcome::Appended | FillOutcome::Discarded => {}
            }
        }
    }

    /// Compares rounded buffered duration against the completion
    /// threshold; emits the completion event on the crossing pass.
    fn check_complete(&mut self) -> bool {
        if self.complete {
            return true;
        }
        let buffered = round_tenth(self.buffer.buffered_duration());
        if buffered >= self.track_duration - self.config.completion_tolerance_secs {
            self.complete = true;
            log::info!(
                "[Controller] Buffer complete at {:.1}s of {:.1}s",
                buffered,
                self.track_duration
            );
            self.emitter.emit_buffer(BufferEvent::Complete {
                buffered_secs: buffered,
                timestamp: now_millis(),
            });
        }
        self.complete
    }

    /// Dequeues until the batch holds at least `min_batch_frames` frames,
    /// polling when the queue is momentarily empty. Returns `None` only
    /// when the consecutive-miss budget runs out with nothing collected;
    /// a partial batch gathered before the budget ran out is returned so
    /// its audio is not lost, and the stall surfaces on the next pass.
    async fn collect_batch(&mut self) -> PlayerResult<Option<BytesMut>> {
        let mut batch = BytesMut::new();
        let mut frames = 0usize;
        let poll = Duration::from_millis(self.config.dequeue_poll_interval_ms);

        while frames < self.config.min_batch_frames {
            match self.queue.dequeue().await? {
                Some(frame) => {
                    self.retry_count = 0;
                    batch.extend_from_slice(&frame.data);
                    frames += 1;
                }
                None => {
                    self.retry_count += 1;
                    if self.retry_count >= self.config.dequeue_retry_cap {
                        if frames > 0 {
                            // Keep what was collected; only the stall is new.
                            return Ok(Some(batch));
                        }
                        return Ok(None);
                    }
                    tokio::time::sleep(poll).await;
                }
            }
        }
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioSegment;
    use crate::error::DecodeError;
    use crate::events::test_support::RecordingEventEmitter;
    use crate::splitter::ReassembledFrame;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    const SAMPLE_RATE: u32 = 100;

    /// Decoder producing one sample per input byte per channel, so a batch
    /// of N bytes is N / SAMPLE_RATE seconds of audio. Records its inputs
    /// and can be told to fail a given number of calls.
    struct StubDecoder {
        calls: Mutex<Vec<Bytes>>,
        failures_remaining: Mutex<u32>,
    }

    impl StubDecoder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures_remaining: Mutex::new(0),
            }
        }

        fn failing_first(count: u32) -> Self {
            let decoder = Self::new();
            *decoder.failures_remaining.lock() = count;
            decoder
        }
    }

    #[async_trait]
    impl AudioDecoder for StubDecoder {
        async fn decode(&self, data: Bytes) -> Result<AudioSegment, DecodeError> {
            self.calls.lock().push(data.clone());
            {
                let mut failures = self.failures_remaining.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(DecodeError::Malformed("stub failure".to_string()));
                }
            }
            let samples: Vec<f32> = data.iter().map(|&b| f32::from(b)).collect();
            Ok(AudioSegment::new(SAMPLE_RATE, vec![samples.clone(), samples]))
        }
    }

    fn frame(sequence: u64, len: usize) -> ReassembledFrame {
        ReassembledFrame {
            sequence,
            data: Bytes::from(vec![sequence as u8; len]),
        }
    }

    fn controller(
        track_duration: f64,
        decoder: Arc<StubDecoder>,
        emitter: RecordingEventEmitter,
    ) -> (BufferController, ReorderQueue) {
        let queue = ReorderQueue::spawn();
        let controller = BufferController::new(
            BufferConfig::default(),
            queue.clone(),
            decoder,
            Arc::new(emitter),
            SAMPLE_RATE,
            track_duration,
        );
        (controller, queue)
    }

    #[tokio::test(start_paused = true)]
    async fn batches_five_frames_in_sequence_order() {
        let decoder = Arc::new(StubDecoder::new());
        let emitter = RecordingEventEmitter::new();
        let (mut controller, queue) = controller(600.0, Arc::clone(&decoder), emitter);

        // Enqueue out of order; the batch bytes must come out ascending.
        for sequence in [3u64, 1, 5, 2, 4] {
            queue.enqueue(frame(sequence, 10)).await.expect("enqueue ok");
        }

        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Appended);

        let calls = decoder.calls.lock();
        assert_eq!(calls.len(), 1);
        let expected: Vec<u8> = (1u8..=5).flat_map(|s| vec![s; 10]).collect();
        assert_eq!(&calls[0][..], &expected[..]);
        // 50 bytes at 100 Hz stereo is half a second.
        assert!((controller.buffered_duration() - 0.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_fires_inside_tolerance_and_only_once() {
        let decoder = Arc::new(StubDecoder::new());
        let emitter = RecordingEventEmitter::new();
        let (mut controller, queue) =
            controller(235.0, Arc::clone(&decoder), emitter.clone());

        // 234.2s buffered: five frames totalling 23420 samples at 100 Hz.
        for sequence in 1u64..=5 {
            queue.enqueue(frame(sequence, 4684)).await.expect("enqueue ok");
        }
        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Complete);
        assert!(controller.is_complete());

        // A later pass stays complete without pulling or re-emitting.
        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Complete);
        let complete_events = emitter
            .events
            .lock()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    crate::events::PlayerEvent::Buffer(BufferEvent::Complete { .. })
                )
            })
            .count();
        assert_eq!(complete_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retry_budget_stalls_exactly_once() {
        let decoder = Arc::new(StubDecoder::new());
        let emitter = RecordingEventEmitter::new();
        let (mut controller, _queue) =
            controller(600.0, Arc::clone(&decoder), emitter.clone());

        // Queue never receives anything: 100 consecutive misses, then fatal.
        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Stalled);
        assert_eq!(emitter.stalled_count(), 1);

        // The 101st failure and beyond never re-emit.
        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Stalled);
        assert_eq!(emitter.stalled_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_dequeue_resets_the_miss_counter() {
        let decoder = Arc::new(StubDecoder::new());
        let emitter = RecordingEventEmitter::new();
        let (mut controller, queue) =
            controller(600.0, Arc::clone(&decoder), emitter.clone());

        // Feed frames from a task that trickles them in with gaps shorter
        // than the budget; misses between frames must not accumulate.
        let feeder = queue.clone();
        tokio::spawn(async move {
            for sequence in 1u64..=5 {
                tokio::time::sleep(Duration::from_millis(300)).await;
                feeder.enqueue(frame(sequence, 10)).await.expect("enqueue ok");
            }
        });

        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Appended);
        assert_eq!(emitter.stalled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_discards_batch_and_continues() {
        let decoder = Arc::new(StubDecoder::failing_first(1));
        let emitter = RecordingEventEmitter::new();
        let (mut controller, queue) =
            controller(600.0, Arc::clone(&decoder), emitter.clone());

        for sequence in 1u64..=5 {
            queue.enqueue(frame(sequence, 10)).await.expect("enqueue ok");
        }
        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Discarded);
        assert_eq!(controller.buffered_duration(), 0.0);

        // The next batch decodes; the bad bytes were not retried.
        for sequence in 6u64..=10 {
            queue.enqueue(frame(sequence, 10)).await.expect("enqueue ok");
        }
        assert_eq!(controller.fill().await.expect("fill ok"), FillOutcome::Appended);
        assert_eq!(decoder.calls.lock().len(), 2);
        assert!(controller.buffered_duration() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_duration_never_decreases_and_terminates() {
        let decoder = Arc::new(StubDecoder::new());
        let emitter = RecordingEventEmitter::new();
        // 3.0s track: six batches of five 10-byte frames fill it.
        let (mut controller, queue) = controller(3.0, Arc::clone(&decoder), emitter);

        let mut last = 0.0;
        let mut sequence = 1u64;
        for _ in 0..64 {
            for _ in 0..5 {
                queue.enqueue(frame(sequence, 10)).await.expect("enqueue ok");
                sequence += 1;
            }
            let outcome = controller.fill().await.expect("fill ok");
            let now = controller.buffered_duration();
            assert!(now >= last, "buffered duration must be non-decreasing");
            last = now;
            if outcome == FillOutcome::Complete {
                return;
            }
        }
        panic!("fill never reached completion with a steady frame supply");
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_stops_on_cancellation() {
        let decoder = Arc::new(StubDecoder::new());
        let emitter = RecordingEventEmitter::new();
        let (controller, queue) = controller(600.0, Arc::clone(&decoder), emitter);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(controller.run(cancel.clone()));

        // Keep the queue fed so the loop is mid-work when cancelled.
        for sequence in 1u64..=5 {
            queue.enqueue(frame(sequence, 10)).await.expect("enqueue ok");
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        cancel.cancel();

        task.await.expect("task ok").expect("cancel exits cleanly");
    }
}
