//! Aulos Player - headless streaming AAC player.
//!
//! Two modes share one binary: `serve` streams files from a directory as
//! sequenced chunks over TCP, and `play` connects to such a server and
//! drives the full reassembly pipeline against a clock-based output, so a
//! track audibly "plays" (as timed silence) without any audio device.

mod config;
mod demo;
mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use aulos_core::{
    AdtsProfile, EventEmitter, PlayerEvent, StreamEngine, StreamRequest, TrackMetadata,
    TransportPhase, WireFrame, WireFrameCodec,
};
use clap::{Parser, Subcommand};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::signal;
use tokio_util::codec::FramedWrite;
use uuid::Uuid;

use crate::config::PlayerConfig;
use crate::demo::{ClockOutput, PassthroughDecoder};

/// Aulos Player - streaming AAC reassembly engine, headless.
#[derive(Parser, Debug)]
#[command(name = "aulos-player")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "AULOS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream files from a directory as sequenced chunks over TCP.
    Serve {
        /// Directory the served files live under.
        #[arg(short, long, env = "AULOS_ROOT")]
        root: PathBuf,
    },
    /// Connect to a chunk server and play a track.
    Play {
        /// File name to request from the server.
        file: String,

        /// Track duration in seconds (seeds completion detection).
        #[arg(long)]
        duration: f64,

        /// Track title for event payloads.
        #[arg(long, default_value = "")]
        title: String,

        /// Track artist for event payloads.
        #[arg(long, default_value = "")]
        artist: String,

        /// Track album for event payloads.
        #[arg(long, default_value = "")]
        album: String,

        /// Initial volume (0.0 to 1.0).
        #[arg(long)]
        volume: Option<f64>,

        /// Seek to this position (seconds) once playback starts.
        #[arg(long)]
        seek: Option<f64>,
    },
}

/// Emitter that prints engine events as JSON log lines.
struct ConsoleEventEmitter;

impl ConsoleEventEmitter {
    fn log(&self, event: &PlayerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => log::info!("[Event] {}", json),
            Err(err) => log::warn!("[Event] Unserializable event: {}", err),
        }
    }
}

impl EventEmitter for ConsoleEventEmitter {
    fn emit_stream(&self, event: aulos_core::StreamEvent) {
        self.log(&event.into());
    }

    fn emit_buffer(&self, event: aulos_core::BufferEvent) {
        self.log(&event.into());
    }

    fn emit_transport(&self, event: aulos_core::TransportEvent) {
        self.log(&event.into());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Aulos Player v{}", env!("CARGO_PKG_VERSION"));

    let config = PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Serve { root } => {
            serve::run(
                root,
                &config.host,
                config.port,
                config.chunk_size,
                shutdown_signal(),
            )
            .await
        }
        Command::Play {
            file,
            duration,
            title,
            artist,
            album,
            volume,
            seek,
        } => {
            let metadata = TrackMetadata {
                path: file,
                title,
                artist,
                album,
                duration,
            };
            play(&config, metadata, volume, seek).await
        }
    }
}

async fn play(
    config: &PlayerConfig,
    metadata: TrackMetadata,
    volume: Option<f64>,
    seek: Option<f64>,
) -> Result<()> {
    let profile = AdtsProfile::default();
    let decoder = Arc::new(PassthroughDecoder::new(profile)?);
    let output = ClockOutput::new();
    let mut engine = StreamEngine::new(
        config.to_buffer_config()?,
        profile,
        decoder,
        output,
        Arc::new(ConsoleEventEmitter),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let socket = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    let (read_half, write_half) = socket.into_split();

    // One request envelope opens the stream; the server owns the rest of
    // the conversation.
    let request = StreamRequest {
        file_name: metadata.path.clone(),
        session_id: Uuid::new_v4().to_string(),
    };
    let mut frames = FramedWrite::new(write_half, WireFrameCodec);
    frames
        .send(WireFrame::Data(request.to_payload()?))
        .await
        .context("Failed to send stream request")?;

    engine
        .load(metadata, read_half)
        .await
        .context("Failed to start stream session")?;
    let transport = engine
        .transport()
        .context("Engine has no active session after load")?;

    transport.play().await?;
    if let Some(volume) = volume {
        transport.set_volume(volume).await?;
    }
    if let Some(target) = seek {
        transport.seek(target).await?;
    }

    // Run until the track plays out or the user interrupts.
    let mut status = transport.status_watch();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Interrupted, stopping playback");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    log::warn!("Transport ended unexpectedly");
                    break;
                }
                if status.borrow().phase == TransportPhase::Stopped {
                    log::info!("Track finished");
                    break;
                }
            }
        }
    }

    engine.reset().await;
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
