//! Fan-out worker.
//!
//! One dispatcher drains the queue. Each message is serialized once and
//! sent concurrently to a snapshot of the registry. Failed connections are
//! collected and removed in one batch after the pass, so the registry map
//! is never mutated mid-iteration. Messages are handled strictly one after
//! another, which gives every connection the same global order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use pipewatch_core::{ConnectionId, Envelope};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::MESSAGES_DISPATCHED_TOTAL;
use crate::queue::{BroadcastQueue, Dequeued};
use crate::registry::ConnectionRegistry;

/// Outcome of one dispatch pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Successful sends.
    pub delivered: usize,
    /// Connections removed after a failed send.
    pub failed: Vec<ConnectionId>,
}

/// Drains a [`BroadcastQueue`] into a [`ConnectionRegistry`].
pub struct Dispatcher {
    queue: Arc<BroadcastQueue>,
    registry: Arc<ConnectionRegistry>,
    poll: Duration,
}

impl Dispatcher {
    /// `poll` bounds each wait on the queue; idle bookkeeping runs whenever
    /// it elapses without a message.
    pub fn new(queue: Arc<BroadcastQueue>, registry: Arc<ConnectionRegistry>, poll: Duration) -> Self {
        Self {
            queue,
            registry,
            poll,
        }
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut consumer = self.queue.consumer().await;
        info!(poll_ms = self.poll.as_millis(), "dispatcher started");
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = consumer.next(self.poll) => next,
            };
            match next {
                Dequeued::Message(envelope) => {
                    let _ = self.dispatch(&envelope).await;
                }
                Dequeued::Idle => self.idle().await,
            }
        }
        info!("dispatcher stopped");
    }

    /// Deliver one message to every registered connection.
    pub async fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let kind = envelope.message_type();
        let frame: Arc<str> = match envelope.to_frame() {
            Ok(frame) => Arc::from(frame),
            Err(e) => {
                warn!(message_type = %kind, error = %e, "failed to serialize message, dropping");
                return DispatchReport::default();
            }
        };

        let targets = self.registry.snapshot().await;
        let outcomes = join_all(targets.iter().map(|conn| {
            let frame = Arc::clone(&frame);
            async move { (conn.id.clone(), self.registry.deliver(conn, frame).await.is_ok()) }
        }))
        .await;

        let recipients = outcomes.len();
        let failed: Vec<ConnectionId> = outcomes
            .into_iter()
            .filter_map(|(id, ok)| (!ok).then_some(id))
            .collect();
        let delivered = recipients - failed.len();

        if !failed.is_empty() {
            let removed = self.registry.remove_batch(&failed).await;
            warn!(message_type = %kind, failed = failed.len(), removed, "dropped connections after failed sends");
        }
        counter!(MESSAGES_DISPATCHED_TOTAL, "type" => kind.as_str()).increment(1);
        debug!(message_type = %kind, recipients, delivered, "dispatched");

        DispatchReport {
            recipients,
            delivered,
            failed,
        }
    }

    async fn idle(&self) {
        let pruned = self.registry.prune_closed().await;
        if pruned > 0 {
            debug!(pruned, "idle sweep removed closed connections");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Handshake;
    use crate::provider::SnapshotCache;
    use crate::testing::{MockTransport, ScriptedProvider};
    use crate::transport::Transport;
    use pipewatch_core::{HubMessage, MetricsSnapshot, TestMessage, TransportError};

    struct Fixture {
        queue: Arc<BroadcastQueue>,
        registry: Arc<ConnectionRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let handshake = Handshake::new(
                Arc::new(ScriptedProvider::new(MetricsSnapshot::zeroed())),
                Arc::new(SnapshotCache::new()),
                Duration::from_millis(200),
            );
            Self {
                queue: Arc::new(BroadcastQueue::new(1_000)),
                registry: Arc::new(ConnectionRegistry::new(handshake, Duration::from_millis(200))),
            }
        }

        fn dispatcher(&self) -> Dispatcher {
            Dispatcher::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.registry),
                Duration::from_millis(50),
            )
        }

        async fn connect(&self) -> (ConnectionId, Arc<MockTransport>) {
            let transport = Arc::new(MockTransport::new());
            let id = self.registry.register(transport.clone(), None).await;
            (id, transport)
        }
    }

    fn test_message(sequence: u64) -> Envelope {
        Envelope::new(HubMessage::TestMessage(TestMessage {
            note: format!("m{sequence}"),
            sequence,
        }))
    }

    fn sequences(transport: &MockTransport) -> Vec<u64> {
        transport
            .json_frames()
            .iter()
            .filter(|f| f["type"] == "test_message")
            .filter_map(|f| f["data"]["sequence"].as_u64())
            .collect()
    }

    #[tokio::test]
    async fn every_connection_gets_every_message_in_order() {
        let fx = Fixture::new();
        let (_, a) = fx.connect().await;
        let (_, b) = fx.connect().await;
        let (_, c) = fx.connect().await;

        for i in 0..20 {
            fx.queue.enqueue(test_message(i));
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fx.dispatcher().run(cancel.clone()));

        for t in [&a, &b, &c] {
            assert!(t.wait_for_frames(21, Duration::from_secs(5)).await);
        }
        cancel.cancel();
        handle.await.unwrap();

        let expected: Vec<u64> = (0..20).collect();
        assert_eq!(sequences(&a), expected);
        assert_eq!(sequences(&b), expected);
        assert_eq!(sequences(&c), expected);
    }

    #[tokio::test]
    async fn failing_connection_is_isolated_and_removed() {
        let fx = Fixture::new();
        let (_, good) = fx.connect().await;
        let (bad_id, bad) = fx.connect().await;
        bad.fail_with(TransportError::Io("reset".into()));

        let dispatcher = fx.dispatcher();
        let report = dispatcher.dispatch(&test_message(1)).await;
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![bad_id.clone()]);
        assert_eq!(fx.registry.count(), 1);
        assert!(fx.registry.get(&bad_id).await.is_none());

        let report = dispatcher.dispatch(&test_message(2)).await;
        assert_eq!(report.recipients, 1);
        assert_eq!(sequences(&good), vec![1, 2]);
        assert!(sequences(&bad).is_empty());
        assert_eq!(fx.registry.failed_sends(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_connection_times_out_without_blocking_others() {
        let fx = Fixture::new();
        let (_, fast) = fx.connect().await;
        let slow = Arc::new(MockTransport::new().with_delay(Duration::from_secs(30)));
        let slow_id = fx.registry.register(slow, None).await;

        let report = fx.dispatcher().dispatch(&test_message(7)).await;
        assert_eq!(report.failed, vec![slow_id]);
        assert_eq!(sequences(&fast), vec![7]);
    }

    #[tokio::test]
    async fn no_connections_is_a_noop_pass() {
        let fx = Fixture::new();
        let report = fx.dispatcher().dispatch(&test_message(1)).await;
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sweep_prunes_closed_transports() {
        let fx = Fixture::new();
        let (_, t) = fx.connect().await;
        t.close().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fx.dispatcher().run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.registry.count(), 0);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_stops_an_idle_dispatcher() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fx.dispatcher().run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
