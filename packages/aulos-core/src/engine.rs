//! The stream engine: wiring from inbound bytes to the transport.
//!
//! [`StreamEngine`] owns one active session at a time. Loading a track
//! spawns two tasks besides the transport:
//! - the pump: demultiplexes the wire stream, splits chunks into frames,
//!   and enqueues them into the reassembly queue
//! - the fill loop: the buffer controller's timer-driven decode pass
//!
//! A session reset cancels both through a shared [`CancellationToken`],
//! clears the reassembly worker's queue, and drops the playback buffer.
//! That is the only path that destroys accumulated audio before a track
//! completes.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::adts::AdtsProfile;
use crate::buffer::BufferReader;
use crate::config::BufferConfig;
use crate::controller::BufferController;
use crate::error::{PlayerError, PlayerResult};
use crate::events::{EventEmitter, StreamEvent, now_millis};
use crate::output::{AudioDecoder, AudioOutput};
use crate::protocol_constants::DEFAULT_SAMPLE_RATE;
use crate::reorder::ReorderQueue;
use crate::session::{StreamSession, TrackMetadata};
use crate::splitter::FrameSplitter;
use crate::transport::Transport;
use crate::wire::{DemuxEvent, demux_stream};

/// One loaded track: its tasks, queue, and control handles.
struct ActiveSession {
    session_id: String,
    cancel: CancellationToken,
    queue: ReorderQueue,
    transport: Transport,
    reader: BufferReader,
    pump: JoinHandle<PlayerResult<()>>,
    fill: JoinHandle<PlayerResult<()>>,
}

/// Top-level engine over caller-supplied decode and output capabilities.
pub struct StreamEngine {
    buffer_config: BufferConfig,
    profile: AdtsProfile,
    decoder: Arc<dyn AudioDecoder>,
    output: Arc<dyn AudioOutput>,
    emitter: Arc<dyn EventEmitter>,
    active: Option<ActiveSession>,
}

impl StreamEngine {
    pub fn new(
        buffer_config: BufferConfig,
        profile: AdtsProfile,
        decoder: Arc<dyn AudioDecoder>,
        output: Arc<dyn AudioOutput>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            buffer_config,
            profile,
            decoder,
            output,
            emitter,
            active: None,
        }
    }

    /// Starts a session for `metadata`, consuming wire bytes from `stream`
    /// (the caller has already sent the stream request on its write side).
    /// Any previous session is reset first.
    pub async fn load<R>(&mut self, metadata: TrackMetadata, stream: R) -> PlayerResult<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.reset().await;

        let session = StreamSession::new(metadata, self.buffer_config.completion_tolerance_secs)?;
        let session_id = session.id().to_string();
        let track_duration = session.track_duration();
        let sample_rate = self
            .profile
            .sample_rate_hz()
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        let cancel = CancellationToken::new();
        let queue = ReorderQueue::spawn();
        let controller = BufferController::new(
            self.buffer_config.clone(),
            queue.clone(),
            Arc::clone(&self.decoder),
            Arc::clone(&self.emitter),
            sample_rate,
            track_duration,
        );
        let reader = controller.reader();
        let transport = Transport::spawn(
            controller.reader(),
            Arc::clone(&self.output),
            Arc::clone(&self.emitter),
            track_duration,
            self.buffer_config.completion_tolerance_secs,
        );

        self.emitter.emit_stream(StreamEvent::Started {
            session_id: session_id.clone(),
            path: session.metadata().path.clone(),
            timestamp: now_millis(),
        });

        let fill = tokio::spawn(controller.run(cancel.clone()));
        let pump = tokio::spawn(pump_stream(
            stream,
            session,
            self.profile,
            queue.clone(),
            Arc::clone(&self.emitter),
            cancel.clone(),
        ));

        self.active = Some(ActiveSession {
            session_id,
            cancel,
            queue,
            transport,
            reader,
            pump,
            fill,
        });
        Ok(())
    }

    /// The active session's transport handle.
    #[must_use]
    pub fn transport(&self) -> Option<Transport> {
        self.active.as_ref().map(|s| s.transport.clone())
    }

    /// Seconds of decoded audio buffered for the active session.
    #[must_use]
    pub fn buffered_duration(&self) -> f64 {
        self.active
            .as_ref()
            .map_or(0.0, |s| s.reader.buffered_duration())
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.session_id.as_str())
    }

    /// Tears the active session down: cancels the pump and fill tasks,
    /// empties the reassembly worker, stops the transport. Idempotent.
    pub async fn reset(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };
        log::info!("[Engine] Resetting session {}", session.session_id);

        session.cancel.cancel();
        if session.transport.stop().await.is_err() {
            log::debug!("[Engine] Transport already gone during reset");
        }
        if session.queue.clear().await.is_err() {
            log::debug!("[Engine] Reorder worker already gone during reset");
        }
        for (name, handle) in [("pump", session.pump), ("fill", session.fill)] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::warn!("[Engine] {} task ended with: {}", name, err),
                Err(err) => log::warn!("[Engine] {} task panicked: {}", name, err),
            }
        }
    }
}

/// Network path: demultiplex, split, enqueue. Runs until the end signal,
/// a transport error, or cancellation.
async fn pump_stream<R>(
    stream: R,
    mut session: StreamSession,
    profile: AdtsProfile,
    queue: ReorderQueue,
    emitter: Arc<dyn EventEmitter>,
    cancel: CancellationToken,
) -> PlayerResult<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let events = demux_stream(stream);
    tokio::pin!(events);
    let mut splitter = FrameSplitter::new(profile);
    let mut chunks = 0u64;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("[Engine] Pump cancelled for session {}", session.id());
                return Ok(());
            }
            event = events.next() => event,
        };
        match event {
            Some(Ok(DemuxEvent::Chunk(chunk))) => {
                chunks += 1;
                session.observe_sequence(chunk.sequence);
                if let Some(frame) = splitter.split(&chunk) {
                    queue.enqueue(frame).await?;
                }
            }
            Some(Ok(DemuxEvent::End)) => {
                // The final codec frame has no closing boundary; flush it.
                if let Some(tail) = splitter.flush() {
                    queue.enqueue(tail).await?;
                }
                log::info!(
                    "[Engine] Stream ended for session {} after {} chunks",
                    session.id(),
                    chunks
                );
                emitter.emit_stream(StreamEvent::Ended {
                    session_id: session.id().to_string(),
                    chunks,
                    timestamp: now_millis(),
                });
            }
            Some(Err(err)) => {
                let err: PlayerError = err.into();
                log::error!("[Engine] Session {} transport failure: {}", session.id(), err);
                emitter.emit_stream(StreamEvent::failed(session.id(), &err));
                return Err(err);
            }
            None => return Ok(()),
        }
    }
}
