//! Initial-state computation for newly accepted connections.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pipewatch_core::{InitialState, MetricsSnapshot, SnapshotSource, StageGraph};
use tracing::warn;

use crate::metrics::PROVIDER_FAILURES_TOTAL;
use crate::provider::{SnapshotCache, SnapshotProvider, fetch_snapshot};

/// Builds the `initial_state` payload.
///
/// Metrics come from the first source that works: a live fetch bounded by
/// `timeout`, then the sampler's cached snapshot, then zeros.
#[derive(Clone)]
pub struct Handshake {
    provider: Arc<dyn SnapshotProvider>,
    cache: Arc<SnapshotCache>,
    timeout: Duration,
}

impl Handshake {
    /// Create a handshake over `provider` and the shared `cache`.
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        cache: Arc<SnapshotCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    /// Compute a fresh initial state with an idle stage graph.
    pub async fn initial_state(&self, active_connections: usize) -> InitialState {
        let (metrics, source) = self.best_metrics().await;
        InitialState {
            pipeline: StageGraph::baseline(),
            system_metrics: metrics.with_active_connections(active_connections),
            source,
        }
    }

    async fn best_metrics(&self) -> (MetricsSnapshot, SnapshotSource) {
        match fetch_snapshot(self.provider.as_ref(), self.timeout).await {
            Ok(snapshot) => (snapshot, SnapshotSource::Live),
            Err(e) => {
                counter!(PROVIDER_FAILURES_TOTAL).increment(1);
                if let Some(cached) = self.cache.latest() {
                    warn!(provider = self.provider.name(), error = %e, "live snapshot failed, seeding initial state from cache");
                    (cached, SnapshotSource::Cached)
                } else {
                    warn!(provider = self.provider.name(), error = %e, "no snapshot available, seeding initial state with zeros");
                    (MetricsSnapshot::zeroed(), SnapshotSource::Default)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, host_snapshot};
    use pipewatch_core::{StageStatus, logging::capture_logs};

    fn handshake(provider: ScriptedProvider, cache: Arc<SnapshotCache>) -> Handshake {
        Handshake::new(Arc::new(provider), cache, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn live_snapshot_preferred() {
        let hs = handshake(
            ScriptedProvider::new(host_snapshot(12.3, 40.1)),
            Arc::new(SnapshotCache::new()),
        );
        let state = hs.initial_state(3).await;
        assert_eq!(state.source, SnapshotSource::Live);
        assert!((state.system_metrics.system_health.cpu - 12.3).abs() < f64::EPSILON);
        assert_eq!(state.system_metrics.connection_status.active_connections, 3);
    }

    #[tokio::test]
    async fn falls_back_to_cache() {
        let cache = Arc::new(SnapshotCache::new());
        cache.store(host_snapshot(55.0, 60.0));
        let hs = handshake(ScriptedProvider::failing(), cache);
        let state = hs.initial_state(1).await;
        assert_eq!(state.source, SnapshotSource::Cached);
        assert!((state.system_metrics.system_health.cpu - 55.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn falls_back_to_zeros_with_warning() {
        let (logs, _guard) = capture_logs();
        let hs = handshake(ScriptedProvider::failing(), Arc::new(SnapshotCache::new()));
        let state = hs.initial_state(0).await;
        assert_eq!(state.source, SnapshotSource::Default);
        assert_eq!(state.system_metrics, MetricsSnapshot::zeroed());
        assert!(logs.has_event(tracing::Level::WARN, "seeding initial state with zeros"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_does_not_block_handshake() {
        let provider =
            ScriptedProvider::new(host_snapshot(1.0, 1.0)).with_delay(Duration::from_secs(60));
        let hs = handshake(provider, Arc::new(SnapshotCache::new()));
        let state = hs.initial_state(0).await;
        assert_eq!(state.source, SnapshotSource::Default);
    }

    #[tokio::test]
    async fn stage_graph_is_idle_and_valid() {
        let hs = handshake(
            ScriptedProvider::new(MetricsSnapshot::zeroed()),
            Arc::new(SnapshotCache::new()),
        );
        let state = hs.initial_state(0).await;
        state.pipeline.validate().unwrap();
        assert!(state.pipeline.stages.iter().all(|s| s.status == StageStatus::Idle));
        assert!(state.pipeline.edges.iter().all(|e| !e.active));
    }
}
