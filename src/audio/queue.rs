//! Bounded single-producer/single-consumer frame queue.
//!
//! The producer half runs inside a driver callback and must never block, so a
//! full queue evicts its oldest unconsumed frame and counts the drop instead
//! of waiting for the consumer.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend::AudioFrame;

enum QueueItem {
    Frame(AudioFrame),
    Failed(String),
}

/// What the consumer observed while waiting for the next frame.
#[derive(Debug)]
pub enum Next {
    Frame(AudioFrame),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The driver reported a device failure.
    Failed(String),
    /// Every producer handle is gone.
    Closed,
}

/// Create a queue holding at most `capacity` frames of `frame_size` samples.
pub fn frame_queue(
    capacity: usize,
    frame_size: usize,
    sample_rate: u32,
) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    let producer = FrameProducer {
        tx: tx.clone(),
        evict: rx.clone(),
        dropped: Arc::clone(&dropped),
        frame_size: frame_size.max(1),
        sample_rate,
        pending: Vec::with_capacity(frame_size.max(1)),
        next_sequence: 0,
        opened_at: Instant::now(),
    };
    let consumer = FrameConsumer { rx, dropped };

    (producer, consumer)
}

/// Producer half, owned by the capture driver.
///
/// Assembles arbitrary-length sample runs into fixed-size frames and stamps
/// each with its sequence index.
pub struct FrameProducer {
    tx: Sender<QueueItem>,
    // Receiver clone used only to evict the oldest frame when full.
    evict: Receiver<QueueItem>,
    dropped: Arc<AtomicU64>,
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<i16>,
    next_sequence: u64,
    opened_at: Instant,
}

impl FrameProducer {
    /// Append mono samples; every completed frame is enqueued immediately.
    pub fn push_samples(&mut self, samples: &[i16]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                let frame = AudioFrame {
                    samples,
                    sample_rate: self.sample_rate,
                    sequence: self.next_sequence,
                    timestamp_ms: self.opened_at.elapsed().as_millis() as u64,
                };
                self.next_sequence += 1;
                self.enqueue(QueueItem::Frame(frame));
            }
        }
    }

    /// Number of samples in one frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Handle for reporting a device failure from another driver callback.
    pub fn fault_reporter(&self) -> FaultReporter {
        FaultReporter {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
        }
    }

    /// Frames evicted so far because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, item: QueueItem) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                // Evict the oldest frame to make room for the newest one.
                if self.evict.try_recv().is_ok() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                if self.tx.try_send(item).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Clonable failure path into the frame queue.
#[derive(Clone)]
pub struct FaultReporter {
    tx: Sender<QueueItem>,
    evict: Receiver<QueueItem>,
}

impl FaultReporter {
    pub fn report(&self, reason: impl Into<String>) {
        let mut item = QueueItem::Failed(reason.into());
        loop {
            match self.tx.try_send(item) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    let _ = self.evict.try_recv();
                }
            }
        }
    }
}

/// Consumer half, owned by the session worker.
pub struct FrameConsumer {
    rx: Receiver<QueueItem>,
    dropped: Arc<AtomicU64>,
}

impl FrameConsumer {
    /// Wait up to `timeout` for the next frame.
    pub fn next(&self, timeout: Duration) -> Next {
        match self.rx.recv_timeout(timeout) {
            Ok(QueueItem::Frame(frame)) => Next::Frame(frame),
            Ok(QueueItem::Failed(reason)) => Next::Failed(reason),
            Err(RecvTimeoutError::Timeout) => Next::Timeout,
            // The producer keeps an eviction receiver, so a disconnect only
            // happens once every sender is gone.
            Err(RecvTimeoutError::Disconnected) => Next::Closed,
        }
    }

    /// Frames evicted so far because this consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
