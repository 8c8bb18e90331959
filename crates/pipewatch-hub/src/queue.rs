//! Global FIFO of outbound messages.
//!
//! Unbounded: producers never block and nothing is dropped before dispatch.
//! Depth is tracked so a sustained producer/dispatcher mismatch shows up as
//! a gauge and a warning instead of silent memory growth.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use pipewatch_core::Envelope;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::warn;

use crate::metrics::{MESSAGES_ENQUEUED_TOTAL, QUEUE_DEPTH};

/// Ordered buffer between producers and the dispatcher.
pub struct BroadcastQueue {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    depth: AtomicUsize,
    warn_depth: usize,
}

/// Outcome of one bounded wait on the queue.
#[derive(Debug)]
pub enum Dequeued {
    /// Next message in FIFO order.
    Message(Envelope),
    /// Nothing arrived within the wait.
    Idle,
}

impl BroadcastQueue {
    /// Empty queue that warns whenever depth climbs to `warn_depth`.
    pub fn new(warn_depth: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
            warn_depth: warn_depth.max(1),
        }
    }

    /// Append without blocking.
    pub fn enqueue(&self, envelope: Envelope) {
        let kind = envelope.message_type().as_str();
        // Counted before sending so the dispatcher can never decrement first.
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if self.tx.send(envelope).is_err() {
            let _ = self.depth.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        counter!(MESSAGES_ENQUEUED_TOTAL, "type" => kind).increment(1);
        record_depth(depth);
        if depth == self.warn_depth {
            warn!(
                queue_depth = depth,
                warn_depth = self.warn_depth,
                "broadcast queue is backing up"
            );
        }
    }

    /// Messages not yet taken by the dispatcher.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Exclusive consumer handle. The dispatcher holds it for its lifetime.
    pub async fn consumer(&self) -> QueueConsumer<'_> {
        QueueConsumer {
            rx: self.rx.lock().await,
            queue: self,
        }
    }

    /// Discard every pending message. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut consumer = self.consumer().await;
        let mut dropped = 0;
        while consumer.rx.try_recv().is_ok() {
            consumer.queue.taken();
            dropped += 1;
        }
        dropped
    }

    fn taken(&self) {
        let prev = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_sub(1)))
            .unwrap_or(0);
        record_depth(prev.saturating_sub(1));
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_depth(depth: usize) {
    gauge!(QUEUE_DEPTH).set(depth as f64);
}

/// Receiving side of a [`BroadcastQueue`].
pub struct QueueConsumer<'a> {
    rx: MutexGuard<'a, mpsc::UnboundedReceiver<Envelope>>,
    queue: &'a BroadcastQueue,
}

impl QueueConsumer<'_> {
    /// Wait up to `wait` for the next message.
    pub async fn next(&mut self, wait: Duration) -> Dequeued {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(envelope)) => {
                self.queue.taken();
                Dequeued::Message(envelope)
            }
            Ok(None) | Err(_) => Dequeued::Idle,
        }
    }
}
