//! Serve mode: streams files as sequenced chunks over TCP.
//!
//! One connection, one stream: the client sends a single request envelope
//! naming the file, the server answers with data envelopes of `chunk_size`
//! bytes each (sequence numbers starting at 1) and terminates with the end
//! signal.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use aulos_core::protocol_constants::FIRST_SEQUENCE;
use aulos_core::{Chunk, StreamRequest, WireFrame, WireFrameCodec};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

/// Accepts connections until the shutdown future resolves.
pub async fn run(
    root: PathBuf,
    host: &str,
    port: u16,
    chunk_size: usize,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    log::info!("[Serve] Listening on {}:{} (root {})", host, port, root.display());

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                log::info!("[Serve] Shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = accepted.context("Accept failed")?;
                log::info!("[Serve] Connection from {}", peer);
                let root = root.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(&root, socket, chunk_size).await {
                        log::warn!("[Serve] Session with {} failed: {:#}", peer, err);
                    }
                });
            }
        }
    }
}

/// Resolves a requested file name under the serving root, rejecting
/// anything that would escape it.
fn resolve(root: &Path, file_name: &str) -> Result<PathBuf> {
    let relative = Path::new(file_name);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        bail!("file name {file_name:?} escapes the serving root");
    }
    Ok(root.join(relative))
}

async fn handle_client(root: &Path, socket: TcpStream, chunk_size: usize) -> Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut requests = FramedRead::new(read_half, WireFrameCodec);
    let mut frames = FramedWrite::new(write_half, WireFrameCodec);

    let request = match requests.next().await {
        Some(Ok(WireFrame::Data(payload))) => StreamRequest::from_payload(&payload)?,
        Some(Ok(WireFrame::End)) => bail!("client sent end signal instead of a request"),
        Some(Err(err)) => return Err(err).context("Malformed request envelope"),
        None => bail!("connection closed before a request arrived"),
    };
    log::info!(
        "[Serve] Session {} requests '{}'",
        request.session_id,
        request.file_name
    );

    let path = resolve(root, &request.file_name)?;
    let mut file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut buf = vec![0u8; chunk_size];
    let mut sequence = FIRST_SEQUENCE;
    loop {
        let n = file.read(&mut buf).await.context("File read failed")?;
        if n == 0 {
            break;
        }
        let chunk = Chunk {
            sequence,
            data: Bytes::copy_from_slice(&buf[..n]),
        };
        frames
            .send(WireFrame::Data(chunk.to_payload()))
            .await
            .context("Chunk send failed")?;
        sequence += 1;
    }
    frames
        .send(WireFrame::End)
        .await
        .context("End signal send failed")?;
    log::info!(
        "[Serve] Session {} complete, {} chunks sent",
        request.session_id,
        sequence - 1
    );
    Ok(())
}
