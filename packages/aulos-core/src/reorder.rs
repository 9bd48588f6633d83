//! Sequence-ordered reassembly queue.
//!
//! Reassembled frames can finish processing out of order, so they pass
//! through an ordering buffer before decode. The buffer runs on its own
//! worker task: ordering cost never blocks the network path, and all
//! communication is message passing over a typed request/response channel —
//! the worker's heap is never shared.
//!
//! Ordering contract: [`ReorderQueue::dequeue`] returns the lowest-sequence
//! buffered frame, so repeated dequeues observe non-decreasing sequences.
//! The queue does NOT wait for missing intermediate sequences; an empty
//! response means "try again later", and the consumer owns the bounded
//! retry budget (see [`crate::controller`]).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tokio::sync::{mpsc, oneshot};

use crate::error::{PlayerError, PlayerResult};
use crate::splitter::ReassembledFrame;

/// Depth of the worker's request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Requests understood by the queue worker.
#[derive(Debug)]
pub enum QueueRequest {
    /// Buffer a frame for ordered release.
    Enqueue(ReassembledFrame),
    /// Release the lowest-sequence buffered frame.
    Dequeue,
    /// Discard every buffered frame (session reset).
    Clear,
}

/// Responses produced by the queue worker.
#[derive(Debug)]
pub enum QueueResponse {
    /// The frame was buffered.
    Enqueued,
    /// The lowest-sequence frame.
    Dequeued(ReassembledFrame),
    /// Nothing buffered right now.
    Empty,
    /// The queue was emptied.
    Cleared,
}

/// Min-heap ordering by sequence number.
struct BySequence(ReassembledFrame);

impl PartialEq for BySequence {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence == other.0.sequence
    }
}

impl Eq for BySequence {}

impl PartialOrd for BySequence {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BySequence {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.sequence.cmp(&other.0.sequence)
    }
}

type Request = (QueueRequest, oneshot::Sender<QueueResponse>);

/// Handle to the reassembly queue worker.
///
/// Cloneable; the worker exits when every handle is dropped.
#[derive(Clone)]
pub struct ReorderQueue {
    tx: mpsc::Sender<Request>,
}

impl ReorderQueue {
    /// Spawns the worker task and returns a handle to it.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(worker(rx));
        Self { tx }
    }

    /// Buffers a frame for ordered release.
    pub async fn enqueue(&self, frame: ReassembledFrame) -> PlayerResult<()> {
        match self.request(QueueRequest::Enqueue(frame)).await? {
            QueueResponse::Enqueued => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Releases the lowest-sequence buffered frame, or `None` when the
    /// queue is empty at this instant.
    pub async fn dequeue(&self) -> PlayerResult<Option<ReassembledFrame>> {
        match self.request(QueueRequest::Dequeue).await? {
            QueueResponse::Dequeued(frame) => Ok(Some(frame)),
            QueueResponse::Empty => Ok(None),
            other => Err(unexpected(&other)),
        }
    }

    /// Discards every buffered frame.
    pub async fn clear(&self) -> PlayerResult<()> {
        match self.request(QueueRequest::Clear).await? {
            QueueResponse::Cleared => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn request(&self, request: QueueRequest) -> PlayerResult<QueueResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| PlayerError::Internal("reorder worker is gone".to_string()))?;
        reply_rx
            .await
            .map_err(|_| PlayerError::Internal("reorder worker dropped a reply".to_string()))
    }
}

fn unexpected(response: &QueueResponse) -> PlayerError {
    PlayerError::Internal(format!("unexpected reorder response: {response:?}"))
}

/// The worker loop: owns the heap, answers one request at a time.
async fn worker(mut rx: mpsc::Receiver<Request>) {
    let mut heap: BinaryHeap<Reverse<BySequence>> = BinaryHeap::new();

    while let Some((request, reply)) = rx.recv().await {
        let response = match request {
            QueueRequest::Enqueue(frame) => {
                heap.push(Reverse(BySequence(frame)));
                QueueResponse::Enqueued
            }
            QueueRequest::Dequeue => match heap.pop() {
                Some(Reverse(BySequence(frame))) => QueueResponse::Dequeued(frame),
                None => QueueResponse::Empty,
            },
            QueueRequest::Clear => {
                let dropped = heap.len();
                heap.clear();
                if dropped > 0 {
                    log::debug!("[Reorder] Cleared {} buffered frames", dropped);
                }
                QueueResponse::Cleared
            }
        };
        // A dropped receiver means the caller gave up waiting; nothing to do.
        let _ = reply.send(response);
    }

    log::debug!("[Reorder] Worker exiting ({} frames abandoned)", heap.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(sequence: u64) -> ReassembledFrame {
        ReassembledFrame {
            sequence,
            data: Bytes::from(sequence.to_be_bytes().to_vec()),
        }
    }

    #[tokio::test]
    async fn releases_arbitrary_permutation_in_ascending_order() {
        let queue = ReorderQueue::spawn();

        // Stride walk over 1..=25 with step 7 (coprime to 25) gives a
        // deterministic non-trivial permutation.
        let n: u64 = 25;
        let mut order = Vec::with_capacity(n as usize);
        let mut current = 0;
        for _ in 0..n {
            current = (current + 7) % n;
            order.push(current + 1);
        }

        for sequence in &order {
            queue.enqueue(frame(*sequence)).await.expect("enqueue ok");
        }

        let mut released = Vec::new();
        while let Some(frame) = queue.dequeue().await.expect("dequeue ok") {
            released.push(frame.sequence);
        }
        let expected: Vec<u64> = (1..=n).collect();
        assert_eq!(released, expected, "no skips, no duplicates, ascending");
    }

    #[tokio::test]
    async fn dequeue_on_empty_returns_none_without_blocking() {
        let queue = ReorderQueue::spawn();
        assert!(queue.dequeue().await.expect("dequeue ok").is_none());

        queue.enqueue(frame(3)).await.expect("enqueue ok");
        assert_eq!(
            queue.dequeue().await.expect("dequeue ok").map(|f| f.sequence),
            Some(3)
        );
        assert!(queue.dequeue().await.expect("dequeue ok").is_none());
    }

    #[tokio::test]
    async fn does_not_wait_for_missing_intermediate_sequences() {
        let queue = ReorderQueue::spawn();
        queue.enqueue(frame(2)).await.expect("enqueue ok");
        queue.enqueue(frame(5)).await.expect("enqueue ok");

        // Sequence 1 never arrives; the queue releases what it has,
        // lowest first, and leaves gap handling to the consumer.
        assert_eq!(
            queue.dequeue().await.expect("dequeue ok").map(|f| f.sequence),
            Some(2)
        );
        assert_eq!(
            queue.dequeue().await.expect("dequeue ok").map(|f| f.sequence),
            Some(5)
        );
    }

    #[tokio::test]
    async fn clear_discards_buffered_frames() {
        let queue = ReorderQueue::spawn();
        for sequence in [4, 1, 9] {
            queue.enqueue(frame(sequence)).await.expect("enqueue ok");
        }
        queue.clear().await.expect("clear ok");
        assert!(queue.dequeue().await.expect("dequeue ok").is_none());
    }

    #[tokio::test]
    async fn late_low_sequence_jumps_the_line() {
        let queue = ReorderQueue::spawn();
        queue.enqueue(frame(10)).await.expect("enqueue ok");
        queue.enqueue(frame(11)).await.expect("enqueue ok");
        assert_eq!(
            queue.dequeue().await.expect("dequeue ok").map(|f| f.sequence),
            Some(10)
        );

        // A straggler with a lower sequence than anything buffered is
        // still released before the rest.
        queue.enqueue(frame(2)).await.expect("enqueue ok");
        assert_eq!(
            queue.dequeue().await.expect("dequeue ok").map(|f| f.sequence),
            Some(2)
        );
        assert_eq!(
            queue.dequeue().await.expect("dequeue ok").map(|f| f.sequence),
            Some(11)
        );
    }
}
