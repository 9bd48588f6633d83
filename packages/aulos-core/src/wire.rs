//! Wire framing for the audio stream RPC channel.
//!
//! Every message on the channel travels in a length-prefixed envelope:
//! a 1-byte flag, a 4-byte big-endian payload length, then the payload.
//! The client sends one [`StreamRequest`] envelope; the server answers with
//! a sequence of chunk envelopes and terminates with an explicit end signal.
//!
//! [`WireFrameCodec`] implements both halves of `tokio_util::codec` so the
//! same framing drives the client, the server, and round-trip tests.
//! [`WireDemux`] is the client-side accumulator: raw bytes in, parsed
//! [`Chunk`]s out, partial envelopes retained across calls.

use async_stream::try_stream;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{TransportError, TransportResult};
use crate::protocol_constants::{
    WIRE_FLAG_DATA, WIRE_FLAG_END, WIRE_HEADER_LEN, WIRE_MAX_PAYLOAD_LEN, WIRE_SEQUENCE_LEN,
};

/// Read size for the raw network buffer in [`demux_stream`].
const READ_BUF_LEN: usize = 8 * 1024;

/// One envelope on the wire, payload not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// A data envelope carrying an opaque payload.
    Data(Bytes),
    /// The explicit end-of-stream signal.
    End,
}

/// One application-level chunk: a sequence number and raw audio bytes.
///
/// Sequences are assigned by the sender starting at 1 and increase by
/// exactly 1 per chunk; downstream consumers may still observe them out
/// of order (see [`crate::reorder`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence: u64,
    pub data: Bytes,
}

impl Chunk {
    /// Decodes a chunk from a data envelope payload: an 8-byte big-endian
    /// sequence prefix followed by the audio bytes.
    pub fn from_payload(mut payload: Bytes) -> TransportResult<Self> {
        if payload.len() < WIRE_SEQUENCE_LEN {
            return Err(TransportError::PayloadTruncated(payload.len()));
        }
        let sequence = payload.get_u64();
        Ok(Self {
            sequence,
            data: payload,
        })
    }

    /// Encodes this chunk into a data envelope payload.
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        let mut payload = BytesMut::with_capacity(WIRE_SEQUENCE_LEN + self.data.len());
        payload.put_u64(self.sequence);
        payload.extend_from_slice(&self.data);
        payload.freeze()
    }
}

/// The one-shot request opening a stream session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub file_name: String,
    pub session_id: String,
}

impl StreamRequest {
    /// Serializes the request into a data envelope payload.
    pub fn to_payload(&self) -> TransportResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Deserializes a request from a data envelope payload.
    pub fn from_payload(payload: &[u8]) -> TransportResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Codec for the outer length-prefixed envelope.
#[derive(Debug, Default)]
pub struct WireFrameCodec;

impl Decoder for WireFrameCodec {
    type Item = WireFrame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> TransportResult<Option<WireFrame>> {
        if src.len() < WIRE_HEADER_LEN {
            return Ok(None);
        }

        let flag = src[0];
        if flag != WIRE_FLAG_DATA && flag != WIRE_FLAG_END {
            return Err(TransportError::UnknownFlag(flag));
        }

        let length = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if length > WIRE_MAX_PAYLOAD_LEN {
            return Err(TransportError::PayloadTooLarge(length));
        }

        let total = WIRE_HEADER_LEN + length as usize;
        if src.len() < total {
            // Partial envelope: keep buffering. Reserve the remainder so the
            // next read can complete it without reallocation.
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(WIRE_HEADER_LEN);
        let payload = src.split_to(length as usize).freeze();
        match flag {
            WIRE_FLAG_END => Ok(Some(WireFrame::End)),
            _ => Ok(Some(WireFrame::Data(payload))),
        }
    }
}

impl Encoder<WireFrame> for WireFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, frame: WireFrame, dst: &mut BytesMut) -> TransportResult<()> {
        let (flag, payload) = match frame {
            WireFrame::Data(payload) => (WIRE_FLAG_DATA, payload),
            WireFrame::End => (WIRE_FLAG_END, Bytes::new()),
        };
        if payload.len() as u64 > u64::from(WIRE_MAX_PAYLOAD_LEN) {
            return Err(TransportError::PayloadTooLarge(payload.len() as u32));
        }
        dst.reserve(WIRE_HEADER_LEN + payload.len());
        dst.put_u8(flag);
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

/// A parsed element of the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxEvent {
    /// A decoded audio chunk.
    Chunk(Chunk),
    /// The sender's end-of-stream signal.
    End,
}

/// Client-side demultiplexer: strips envelopes from raw inbound bytes.
///
/// Holds one byte accumulator per stream session. Each [`feed`](Self::feed)
/// appends the new bytes and drains as many complete envelopes as the
/// accumulator holds; a trailing partial envelope stays buffered for the
/// next call. Never blocks.
#[derive(Debug, Default)]
pub struct WireDemux {
    codec: WireFrameCodec,
    accumulator: BytesMut,
}

impl WireDemux {
    /// Creates an empty demultiplexer for a new session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `raw` and returns every chunk completed by it.
    ///
    /// A framing or payload error poisons the session: the caller must
    /// discard this demultiplexer (see [`crate::error::TransportError`]).
    pub fn feed(&mut self, raw: &[u8]) -> TransportResult<Vec<DemuxEvent>> {
        self.accumulator.extend_from_slice(raw);

        let mut events = Vec::new();
        while let Some(frame) = self.codec.decode(&mut self.accumulator)? {
            match frame {
                WireFrame::Data(payload) => {
                    events.push(DemuxEvent::Chunk(Chunk::from_payload(payload)?));
                }
                WireFrame::End => events.push(DemuxEvent::End),
            }
        }
        Ok(events)
    }

    /// Bytes currently buffered awaiting envelope completion.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.accumulator.len()
    }
}

/// Adapts a raw byte reader into a stream of demultiplexed events.
///
/// The stream finishes after yielding [`DemuxEvent::End`], or errors
/// terminally on a framing fault. EOF without the end signal is reported
/// as an error: the session is incomplete.
pub fn demux_stream<R>(mut reader: R) -> impl Stream<Item = TransportResult<DemuxEvent>>
where
    R: AsyncRead + Unpin,
{
    try_stream! {
        let mut demux = WireDemux::new();
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "connection closed with {} bytes buffered and no end signal",
                        demux.pending_len()
                    ),
                )))?;
            }
            for event in demux.feed(&buf[..n])? {
                let done = event == DemuxEvent::End;
                yield event;
                if done {
                    return;
                }
            }
        }
    }
}
