//! Periodic metrics sampler.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pipewatch_core::{Envelope, HubMessage, MetricsSnapshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::PROVIDER_FAILURES_TOTAL;
use crate::provider::{SnapshotCache, SnapshotProvider, fetch_snapshot};
use crate::queue::BroadcastQueue;
use crate::registry::ConnectionRegistry;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Calls the provider on a fixed cadence and enqueues `metrics_update`.
///
/// A failing or slow provider never ends the loop: the tick falls back to
/// the last good snapshot, or zeros if there has never been one.
pub struct Sampler {
    provider: Arc<dyn SnapshotProvider>,
    cache: Arc<SnapshotCache>,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<BroadcastQueue>,
    interval: Duration,
    timeout: Duration,
}

impl Sampler {
    /// `timeout` bounds each provider call. A zero `interval` is raised to
    /// one millisecond.
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        cache: Arc<SnapshotCache>,
        registry: Arc<ConnectionRegistry>,
        queue: Arc<BroadcastQueue>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            registry,
            queue,
            interval: interval.max(MIN_INTERVAL),
            timeout,
        }
    }

    /// Run until `cancel` fires. The first sample is taken immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            provider = self.provider.name(),
            interval_ms = self.interval.as_millis(),
            "sampler started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.sample_once() => {}
            }
        }
        info!("sampler stopped");
    }

    /// Take one sample and enqueue it.
    ///
    /// Only a successful fetch refreshes the cache; a fallback is broadcast
    /// but never stored, so the cache age stays honest.
    pub async fn sample_once(&self) {
        let active = self.registry.count();
        let snapshot = match fetch_snapshot(self.provider.as_ref(), self.timeout).await {
            Ok(snapshot) => {
                let snapshot = snapshot.with_active_connections(active);
                self.cache.store(snapshot.clone());
                snapshot
            }
            Err(e) => {
                counter!(PROVIDER_FAILURES_TOTAL).increment(1);
                let fallback = self.cache.latest();
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    reused_previous = fallback.is_some(),
                    "snapshot failed, broadcasting fallback"
                );
                fallback
                    .unwrap_or_else(MetricsSnapshot::zeroed)
                    .with_active_connections(active)
            }
        };

        self.queue
            .enqueue(Envelope::new(HubMessage::MetricsUpdate(snapshot)));
        debug!(active_connections = active, "metrics sample enqueued");
    }
}
