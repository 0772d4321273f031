// Capture pipeline: microphone blocks -> fixed frames -> wire blobs -> transport
//
// Frames are produced at the device tick rate whatever the transport is
// doing. A bounded queue sits between the two; when it is full the oldest
// frame is dropped so the far end always hears the most recent audio.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::backend::CaptureFrame;
use super::chunk::FrameChunker;
use crate::codec::MediaBlob;
use crate::live::LiveSender;

/// Counters shared between the capture tasks and the session status
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub send_failures: AtomicU64,
}

/// Bounded FIFO of outbound blobs that drops the oldest entry when full
#[derive(Debug)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<MediaBlob>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Enqueue a blob. Returns the blob evicted to make room, if any.
    pub fn push(&self, blob: MediaBlob) -> Option<MediaBlob> {
        let evicted = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(blob);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Wait for the next blob. Returns `None` once closed and drained.
    pub async fn pop(&self) -> Option<MediaBlob> {
        loop {
            {
                let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(blob) = items.pop_front() {
                    return Some(blob);
                }
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Running capture pipeline for one live session
pub struct CapturePipeline {
    encode_task: JoinHandle<()>,
    forward_task: JoinHandle<()>,
    queue: Arc<OutboundQueue>,
}

impl CapturePipeline {
    /// Spawn the encode and forward tasks.
    ///
    /// `frames` is the capture backend's receiver; every complete frame of
    /// `frame_size` samples is sent through `sender` as PCM16 tagged with
    /// `sample_rate`.
    pub fn spawn(
        mut frames: mpsc::Receiver<CaptureFrame>,
        frame_size: usize,
        sample_rate: u32,
        queue_capacity: usize,
        sender: Arc<dyn LiveSender>,
        stats: Arc<CaptureStats>,
    ) -> Self {
        let queue = Arc::new(OutboundQueue::new(queue_capacity));

        let encode_queue = Arc::clone(&queue);
        let encode_stats = Arc::clone(&stats);
        let encode_task = tokio::spawn(async move {
            info!("Capture encode task started ({} samples/frame)", frame_size);
            let mut chunker = FrameChunker::new(frame_size);

            while let Some(block) = frames.recv().await {
                for frame in chunker.push(&block.samples) {
                    let blob = MediaBlob::pcm16(&frame, sample_rate);
                    if encode_queue.push(blob).is_some() {
                        encode_stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("Outbound queue full, dropped oldest frame");
                    }
                }
            }

            // Trailing partial frame is discarded
            encode_queue.close();
            info!("Capture encode task stopped");
        });

        let forward_queue = Arc::clone(&queue);
        let forward_task = tokio::spawn(async move {
            while let Some(blob) = forward_queue.pop().await {
                match sender.send_realtime_input(blob).await {
                    Ok(()) => {
                        stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.send_failures.fetch_add(1, Ordering::Relaxed);
                        error!("Error sending input: {:#}", e);
                    }
                }
            }
            debug!("Capture forward task stopped");
        });

        Self {
            encode_task,
            forward_task,
            queue,
        }
    }

    /// Frames waiting to be sent
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Stop both tasks immediately; queued frames are discarded
    pub fn shutdown(self) {
        self.queue.close();
        self.encode_task.abort();
        self.forward_task.abort();
    }

    /// Wait for the capture source to end and the queue to drain
    pub async fn finish(self) {
        if let Err(e) = self.encode_task.await {
            error!("Capture encode task panicked: {}", e);
        }
        if let Err(e) = self.forward_task.await {
            error!("Capture forward task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(tag: &str) -> MediaBlob {
        MediaBlob {
            data: tag.to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        }
    }

    #[tokio::test]
    async fn queue_drops_oldest_when_full() {
        let queue = OutboundQueue::new(2);
        assert!(queue.push(blob("a")).is_none());
        assert!(queue.push(blob("b")).is_none());
        assert_eq!(queue.push(blob("c")), Some(blob("a")));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await, Some(blob("b")));
        assert_eq!(queue.pop().await, Some(blob("c")));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let queue = OutboundQueue::new(4);
        queue.push(blob("a"));
        queue.close();

        assert_eq!(queue.pop().await, Some(blob("a")));
        assert_eq!(queue.pop().await, None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(OutboundQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.push(blob("late"));

        assert_eq!(waiter.await.unwrap(), Some(blob("late")));
    }
}
