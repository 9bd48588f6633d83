//! Transport state machine: play, pause, seek, volume.
//!
//! Runs as its own task driven by two inputs: control commands from the
//! [`Transport`] handle and completion events from the output. Scheduling is
//! chained — when a scheduled segment finishes, the task schedules the next
//! contiguous buffered region from the point the last one ended — so the
//! chain is a state transition on a completion event, never a recursive
//! callback.
//!
//! The transport only ever reads the playback buffer. Running out of
//! buffered audio mid-track is not an error: the chain halts silently and
//! resumes when the buffer controller appends more.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::buffer::BufferReader;
use crate::error::{PlayerError, PlayerResult};
use crate::events::{EventEmitter, TransportEvent, now_millis};
use crate::output::{AudioOutput, PlaybackHandle, SegmentEnd};

/// Float slack on top of the completion threshold when deciding that
/// playback reached the track's end rather than a mid-track underrun.
const TRACK_END_EPSILON_SECS: f64 = 0.05;

/// The three resting states. A transient seeking flag lives alongside in
/// [`TransportStatus`], orthogonal to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportPhase {
    Stopped,
    Playing,
    Paused,
}

/// Snapshot of transport state, published on every transition.
///
/// `elapsed` is the position at the most recent transition; while playing
/// it advances with the clock from there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    pub phase: TransportPhase,
    pub seeking: bool,
    pub elapsed: f64,
    pub volume: f64,
}

impl Default for TransportStatus {
    fn default() -> Self {
        Self {
            phase: TransportPhase::Stopped,
            seeking: false,
            elapsed: 0.0,
            volume: 1.0,
        }
    }
}

/// Control commands accepted by the transport task.
#[derive(Debug)]
enum TransportCommand {
    Play,
    Pause,
    Seek(f64),
    SetVolume(f64),
    Stop,
}

type Command = (TransportCommand, oneshot::Sender<PlayerResult<()>>);

/// Handle to the transport task.
#[derive(Clone)]
pub struct Transport {
    tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<TransportStatus>,
}

impl Transport {
    /// Spawns the transport task over a buffer reader and an output.
    ///
    /// `track_duration` and `completion_tolerance_secs` distinguish "played
    /// to the end" from a mid-track underrun: the buffer controller stops
    /// filling once it holds `track_duration - tolerance` seconds, so
    /// reaching that point with nothing further buffered is the end of the
    /// track, not a wait for more audio.
    #[must_use]
    pub fn spawn(
        reader: BufferReader,
        output: Arc<dyn AudioOutput>,
        emitter: Arc<dyn EventEmitter>,
        track_duration: f64,
        completion_tolerance_secs: f64,
    ) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(TransportStatus::default());
        tokio::spawn(transport_task(
            rx,
            status_tx,
            reader,
            output,
            emitter,
            track_duration - completion_tolerance_secs,
        ));
        Self { tx, status_rx }
    }

    /// Starts or resumes playback. From `Stopped` this waits until the
    /// buffer holds any audio at all.
    pub async fn play(&self) -> PlayerResult<()> {
        self.send(TransportCommand::Play).await
    }

    /// Pauses playback, recording the elapsed position.
    pub async fn pause(&self) -> PlayerResult<()> {
        self.send(TransportCommand::Pause).await
    }

    /// Jumps the playhead to `elapsed_secs`. Never discards buffered audio.
    pub async fn seek(&self, elapsed_secs: f64) -> PlayerResult<()> {
        self.send(TransportCommand::Seek(elapsed_secs)).await
    }

    /// Applies a new volume immediately, without interrupting playback.
    pub async fn set_volume(&self, volume: f64) -> PlayerResult<()> {
        self.send(TransportCommand::SetVolume(volume)).await
    }

    /// Stops playback and rewinds to the start.
    pub async fn stop(&self) -> PlayerResult<()> {
        self.send(TransportCommand::Stop).await
    }

    /// The status at the most recent transition.
    #[must_use]
    pub fn status(&self) -> TransportStatus {
        *self.status_rx.borrow()
    }

    /// Watch channel over status transitions.
    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<TransportStatus> {
        self.status_rx.clone()
    }

    async fn send(&self, command: TransportCommand) -> PlayerResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((command, ack_tx))
            .await
            .map_err(|_| PlayerError::Internal("transport task is gone".to_string()))?;
        ack_rx
            .await
            .map_err(|_| PlayerError::Internal("transport task dropped a reply".to_string()))?
    }
}

/// One segment currently sounding through the output.
struct ActiveSegment {
    handle: Box<dyn PlaybackHandle>,
    completion: oneshot::Receiver<SegmentEnd>,
    /// Elapsed position at which this segment started.
    base_elapsed: f64,
    /// Elapsed position at which this segment will end.
    end_elapsed: f64,
    started_at: Instant,
}

impl ActiveSegment {
    /// Current playhead position inside this segment.
    fn position(&self) -> f64 {
        let played = self.started_at.elapsed().as_secs_f64();
        (self.base_elapsed + played).min(self.end_elapsed)
    }
}

/// Resolves when the active segment ends; pends forever when none is active.
async fn segment_end(active: &mut Option<ActiveSegment>) -> SegmentEnd {
    match active.as_mut() {
        // A dropped completion sender counts as stopped.
        Some(segment) => (&mut segment.completion)
            .await
            .unwrap_or(SegmentEnd::Stopped),
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_lines)]
async fn transport_task(
    mut rx: mpsc::Receiver<Command>,
    status_tx: watch::Sender<TransportStatus>,
    mut reader: BufferReader,
    output: Arc<dyn AudioOutput>,
    emitter: Arc<dyn EventEmitter>,
    track_end_secs: f64,
) {
    let mut status = TransportStatus::default();
    let mut active: Option<ActiveSegment> = None;
    let mut awaiting_buffer = false;

    let publish = |status_tx: &watch::Sender<TransportStatus>, status: TransportStatus| {
        status_tx.send_replace(status);
    };

    loop {
        tokio::select! {
            biased;

            command = rx.recv() => {
                let Some((command, ack)) = command else { break };
                let result = match command {
                    TransportCommand::Play => {
                        if status.phase == TransportPhase::Playing {
                            Ok(())
                        } else {
                            if status.phase == TransportPhase::Stopped {
                                // First start waits for the controller to
                                // produce at least one segment.
                                reader.wait_for_duration_above(0.0).await;
                            }
                            stop_active(&mut active);
                            active = schedule_from(&reader, &output, status.elapsed).await;
                            awaiting_buffer = active.is_none();
                            status.phase = TransportPhase::Playing;
                            log::info!("[Transport] Playing from {:.2}s", status.elapsed);
                            emitter.emit_transport(TransportEvent::Playing {
                                elapsed: status.elapsed,
                                timestamp: now_millis(),
                            });
                            publish(&status_tx, status);
                            Ok(())
                        }
                    }
                    TransportCommand::Pause => {
                        if status.phase != TransportPhase::Playing {
                            Ok(())
                        } else {
                            if let Some(segment) = &active {
                                status.elapsed = segment.position();
                            }
                            stop_active(&mut active);
                            awaiting_buffer = false;
                            status.phase = TransportPhase::Paused;
                            log::info!("[Transport] Paused at {:.2}s", status.elapsed);
                            emitter.emit_transport(TransportEvent::Paused {
                                elapsed: status.elapsed,
                                timestamp: now_millis(),
                            });
                            publish(&status_tx, status);
                            Ok(())
                        }
                    }
                    TransportCommand::Seek(target) => {
                        if !target.is_finite() || target < 0.0 {
                            Err(PlayerError::InvalidTransport(format!(
                                "seek target {target} is not a non-negative time"
                            )))
                        } else {
                            // The seeking flag silences output for the whole
                            // move: cancel, jump, reschedule.
                            status.seeking = true;
                            publish(&status_tx, status);

                            stop_active(&mut active);
                            status.elapsed = target;
                            if status.phase == TransportPhase::Playing {
                                active = schedule_from(&reader, &output, target).await;
                                awaiting_buffer = active.is_none();
                            }

                            status.seeking = false;
                            log::info!("[Transport] Seeked to {:.2}s", target);
                            emitter.emit_transport(TransportEvent::Seeked {
                                elapsed: target,
                                timestamp: now_millis(),
                            });
                            publish(&status_tx, status);
                            Ok(())
                        }
                    }
                    TransportCommand::SetVolume(volume) => {
                        if !(0.0..=1.0).contains(&volume) {
                            Err(PlayerError::InvalidTransport(format!(
                                "volume {volume} outside 0.0..=1.0"
                            )))
                        } else {
                            output.set_volume(volume);
                            status.volume = volume;
                            emitter.emit_transport(TransportEvent::VolumeChanged {
                                volume,
                                timestamp: now_millis(),
                            });
                            publish(&status_tx, status);
                            Ok(())
                        }
                    }
                    TransportCommand::Stop => {
                        stop_active(&mut active);
                        awaiting_buffer = false;
                        status.phase = TransportPhase::Stopped;
                        status.elapsed = 0.0;
                        log::info!("[Transport] Stopped");
                        emitter.emit_transport(TransportEvent::Stopped {
                            timestamp: now_millis(),
                        });
                        publish(&status_tx, status);
                        Ok(())
                    }
                };
                let _ = ack.send(result);
            }

            end = segment_end(&mut active) => {
                match end {
                    SegmentEnd::Finished => {
                        if let Some(segment) = active.take() {
                            status.elapsed = segment.end_elapsed;
                        }
                        if status.phase == TransportPhase::Playing {
                            // Chain: schedule the next contiguous region.
                            active = schedule_from(&reader, &output, status.elapsed).await;
                            if active.is_none() {
                                if status.elapsed + TRACK_END_EPSILON_SECS >= track_end_secs {
                                    status.phase = TransportPhase::Stopped;
                                    log::info!("[Transport] Track finished");
                                    emitter.emit_transport(TransportEvent::Stopped {
                                        timestamp: now_millis(),
                                    });
                                } else {
                                    // Underrun: halt the chain without an
                                    // error and wait for the buffer to grow.
                                    awaiting_buffer = true;
                                    log::warn!(
                                        "[Transport] Underrun at {:.2}s, waiting for buffer",
                                        status.elapsed
                                    );
                                    emitter.emit_transport(TransportEvent::Underrun {
                                        elapsed: status.elapsed,
                                        timestamp: now_millis(),
                                    });
                                }
                            }
                        }
                        publish(&status_tx, status);
                    }
                    SegmentEnd::Stopped => {
                        // The output gave up on its own; hold position and
                        // behave like a pause.
                        if let Some(segment) = active.take() {
                            status.elapsed = segment.position();
                        }
                        if status.phase == TransportPhase::Playing {
                            status.phase = TransportPhase::Paused;
                            emitter.emit_transport(TransportEvent::Paused {
                                elapsed: status.elapsed,
                                timestamp: now_millis(),
                            });
                        }
                        publish(&status_tx, status);
                    }
                }
            }

            grown = reader.wait_for_duration_above(status.elapsed), if awaiting_buffer => {
                awaiting_buffer = false;
                match grown {
                    Some(_) => {
                        if status.phase == TransportPhase::Playing && active.is_none() {
                            active = schedule_from(&reader, &output, status.elapsed).await;
                            awaiting_buffer = active.is_none();
                        }
                    }
                    None => {
                        // The writing side is gone: the buffer can never
                        // grow past this point, so there is nothing left
                        // to wait for.
                        if status.phase == TransportPhase::Playing {
                            status.phase = TransportPhase::Stopped;
                            log::warn!(
                                "[Transport] Buffer will not grow past {:.2}s, stopping",
                                status.elapsed
                            );
                            emitter.emit_transport(TransportEvent::Stopped {
                                timestamp: now_millis(),
                            });
                            publish(&status_tx, status);
                        }
                    }
                }
            }
        }
    }

    stop_active(&mut active);
    log::debug!("[Transport] Task exiting");
}

/// Stops and discards the active segment, if any. Dropping the completion
/// receiver means the task never sees the resulting Stopped event.
fn stop_active(active: &mut Option<ActiveSegment>) {
    if let Some(segment) = active.take() {
        segment.handle.stop();
    }
}

/// Schedules the contiguous buffered region starting at `elapsed`, or
/// returns `None` when nothing is buffered there yet.
async fn schedule_from(
    reader: &BufferReader,
    output: &Arc<dyn AudioOutput>,
    elapsed: f64,
) -> Option<ActiveSegment> {
    let region = reader.region_from(elapsed)?;
    let duration = region.duration_secs();
    match output.schedule(region, 0.0).await {
        Ok(scheduled) => Some(ActiveSegment {
            handle: scheduled.handle,
            completion: scheduled.completion,
            base_elapsed: elapsed,
            end_elapsed: elapsed + duration,
            started_at: Instant::now(),
        }),
        Err(err) => {
            log::error!("[Transport] Output rejected segment: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{AudioSegment, PlaybackBuffer};
    use crate::error::OutputError;
    use crate::events::test_support::RecordingEventEmitter;
    use crate::events::PlayerEvent;
    use crate::output::Scheduled;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SAMPLE_RATE: u32 = 100;

    type SharedFinish = Arc<Mutex<Option<oneshot::Sender<SegmentEnd>>>>;

    struct ScheduleRecord {
        duration_secs: f64,
        finish_tx: SharedFinish,
    }

    /// Output double: records schedules, tracks how many segments are
    /// audible at once, and lets the test finish segments explicitly.
    #[derive(Default)]
    struct StubOutput {
        schedules: Mutex<Vec<ScheduleRecord>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        volume: Mutex<f64>,
    }

    struct StubHandle {
        finish_tx: SharedFinish,
        active: Arc<AtomicUsize>,
    }

    impl PlaybackHandle for StubHandle {
        fn stop(&self) {
            if let Some(tx) = self.finish_tx.lock().take() {
                let _ = tx.send(SegmentEnd::Stopped);
                self.active.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    impl StubOutput {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                volume: Mutex::new(1.0),
                ..Self::default()
            })
        }

        fn schedule_count(&self) -> usize {
            self.schedules.lock().len()
        }

        /// Completes the most recent still-running segment as finished.
        fn finish_latest(&self) {
            let schedules = self.schedules.lock();
            let tx = schedules
                .iter()
                .rev()
                .find_map(|r| r.finish_tx.lock().take())
                .expect("a running segment");
            let _ = tx.send(SegmentEnd::Finished);
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AudioOutput for StubOutput {
        async fn schedule(
            &self,
            segment: AudioSegment,
            _start_offset_secs: f64,
        ) -> Result<Scheduled, OutputError> {
            let (tx, rx) = oneshot::channel();
            // The handle (stop) and the test (finish_latest) share the
            // finish sender; whoever takes it first decides the outcome.
            let shared: SharedFinish = Arc::new(Mutex::new(Some(tx)));
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            self.schedules.lock().push(ScheduleRecord {
                duration_secs: segment.duration_secs(),
                finish_tx: Arc::clone(&shared),
            });
            Ok(Scheduled {
                handle: Box::new(StubHandle {
                    finish_tx: shared,
                    active: Arc::clone(&self.active),
                }),
                completion: rx,
            })
        }

        fn set_volume(&self, volume: f64) {
            *self.volume.lock() = volume;
        }
    }

    fn buffer_with(seconds: f64) -> PlaybackBuffer {
        let buffer = PlaybackBuffer::new(SAMPLE_RATE);
        append_seconds(&buffer, seconds);
        buffer
    }

    fn append_seconds(buffer: &PlaybackBuffer, seconds: f64) {
        let samples = (seconds * f64::from(SAMPLE_RATE)) as usize;
        buffer.append(&AudioSegment::new(SAMPLE_RATE, vec![vec![0.25; samples]; 2]));
    }

    fn spawn_transport(
        buffer: &PlaybackBuffer,
        output: Arc<StubOutput>,
        track_duration: f64,
    ) -> (Transport, RecordingEventEmitter) {
        let emitter = RecordingEventEmitter::new();
        let transport = Transport::spawn(
            buffer.reader(),
            output,
            Arc::new(emitter.clone()),
            track_duration,
            1.0,
        );
        (transport, emitter)
    }

    fn underrun_count(emitter: &RecordingEventEmitter) -> usize {
        emitter
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Transport(TransportEvent::Underrun { .. })))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn play_waits_for_first_buffered_audio() {
        let buffer = PlaybackBuffer::new(SAMPLE_RATE);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        let handle = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.play().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(output.schedule_count(), 0, "nothing buffered, nothing scheduled");

        append_seconds(&buffer, 2.0);
        handle.await.expect("task ok").expect("play ok");
        assert_eq!(output.schedule_count(), 1);
        assert_eq!(transport.status().phase, TransportPhase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_records_elapsed_and_resume_continues_from_it() {
        let buffer = buffer_with(10.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        tokio::time::advance(Duration::from_secs(3)).await;
        transport.pause().await.expect("pause ok");

        let status = transport.status();
        assert_eq!(status.phase, TransportPhase::Paused);
        assert!((status.elapsed - 3.0).abs() < 0.05, "elapsed {}", status.elapsed);
        assert_eq!(output.active.load(Ordering::SeqCst), 0);

        transport.play().await.expect("resume ok");
        assert_eq!(transport.status().phase, TransportPhase::Playing);
        // The resumed segment covers the remaining ~7 seconds.
        let schedules = output.schedules.lock();
        assert_eq!(schedules.len(), 2);
        assert!((schedules[1].duration_secs - 7.0).abs() < 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_chains_the_next_contiguous_region() {
        let buffer = buffer_with(4.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        assert_eq!(output.schedule_count(), 1);

        // More audio lands while the first segment plays.
        append_seconds(&buffer, 4.0);
        output.finish_latest();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // The chain scheduled the new region starting where the last ended.
        assert_eq!(output.schedule_count(), 2);
        let schedules = output.schedules.lock();
        assert!((schedules[1].duration_secs - 4.0).abs() < 0.05);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_halts_when_paused_before_completion() {
        let buffer = buffer_with(4.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        transport.pause().await.expect("pause ok");

        append_seconds(&buffer, 4.0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        // Paused: the completion chain must not schedule anything new.
        assert_eq!(output.schedule_count(), 1);
        assert_eq!(output.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_seek_to_same_offset_never_double_schedules() {
        let buffer = buffer_with(10.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        transport.seek(2.0).await.expect("seek ok");
        transport.seek(2.0).await.expect("seek ok");

        // Each seek cancels before rescheduling; at no point were two
        // segments audible at once.
        assert_eq!(output.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(output.active.load(Ordering::SeqCst), 1);
        let status = transport.status();
        assert!((status.elapsed - 2.0).abs() < 1e-9);
        assert!(!status.seeking);
        // The rescheduled region is the remaining 8 seconds.
        let schedules = output.schedules.lock();
        assert!((schedules.last().expect("scheduled").duration_secs - 8.0).abs() < 0.05);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_while_paused_moves_playhead_without_scheduling() {
        let buffer = buffer_with(10.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.seek(5.0).await.expect("seek ok");
        assert_eq!(output.schedule_count(), 0);
        assert!((transport.status().elapsed - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn underrun_halts_silently_and_resumes_on_buffer_growth() {
        let buffer = buffer_with(2.0);
        let output = StubOutput::new();
        let (transport, emitter) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        output.finish_latest();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Mid-track with nothing left: still Playing, no error surfaced,
        // nothing audible.
        let status = transport.status();
        assert_eq!(status.phase, TransportPhase::Playing);
        assert_eq!(output.active.load(Ordering::SeqCst), 0);
        assert_eq!(underrun_count(&emitter), 1);

        // Buffer grows: the chain resumes on its own.
        append_seconds(&buffer, 3.0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(output.schedule_count(), 2);
        assert_eq!(output.active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_the_whole_track_stops_the_transport() {
        let buffer = buffer_with(5.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 5.0);

        transport.play().await.expect("play ok");
        output.finish_latest();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(transport.status().phase, TransportPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_complete_within_tolerance_ends_at_the_buffered_end() {
        // The controller stops filling at 234.2s of a 235.0s track (inside
        // the 1.0s tolerance), so the buffered end IS the track end: playing
        // it out must stop the transport, never report an underrun.
        let buffer = buffer_with(234.2);
        let output = StubOutput::new();
        let (transport, emitter) = spawn_transport(&buffer, Arc::clone(&output), 235.0);

        transport.play().await.expect("play ok");
        // The fill loop has exited and released the buffer.
        drop(buffer);
        // Play every scheduled region out (rounding can leave a final
        // sub-sample region that gets its own schedule).
        for _ in 0..4 {
            if output.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            output.finish_latest();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(transport.status().phase, TransportPhase::Stopped);
        assert_eq!(underrun_count(&emitter), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn underrun_with_the_writer_gone_stops_instead_of_waiting() {
        // Mid-track, far from the completion threshold, but the writing
        // side is gone: the buffer can never grow, so the transport must
        // not wait forever.
        let buffer = buffer_with(2.0);
        let output = StubOutput::new();
        let (transport, emitter) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        output.finish_latest();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(underrun_count(&emitter), 1);

        drop(buffer);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.status().phase, TransportPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn volume_applies_immediately_without_interrupting() {
        let buffer = buffer_with(10.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        transport.play().await.expect("play ok");
        transport.set_volume(0.4).await.expect("volume ok");

        assert_eq!(*output.volume.lock(), 0.4);
        assert_eq!(output.active.load(Ordering::SeqCst), 1, "playback uninterrupted");
        assert!((transport.status().volume - 0.4).abs() < 1e-9);

        let err = transport.set_volume(1.5).await.expect_err("out of range");
        assert_eq!(err.code(), "invalid_transport");
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_negative_seek() {
        let buffer = buffer_with(1.0);
        let output = StubOutput::new();
        let (transport, _) = spawn_transport(&buffer, Arc::clone(&output), 60.0);

        let err = transport.seek(-1.0).await.expect_err("negative seek");
        assert_eq!(err.code(), "invalid_transport");
    }
}
