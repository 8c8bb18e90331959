//! Lifecycle controller.
//!
//! [`TelemetryHub`] owns the registry, queue, sampler and dispatcher and is
//! built explicitly by the composition root (`new → start → stop`). Start and
//! stop are idempotent: misuse is reported as a [`Transition`], never an
//! error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipewatch_core::{ConnectionId, Envelope, MetricsSnapshot};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::handshake::Handshake;
use crate::provider::{
    PipelineTracker, ServiceBoard, SnapshotCache, SnapshotProvider, SystemSnapshotProvider,
};
use crate::queue::BroadcastQueue;
use crate::registry::{ConnectionRegistry, RegistryStats};
use crate::sampler::Sampler;
use crate::transport::Transport;

/// Hub timing and sizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Sampler cadence.
    pub sample_interval: Duration,
    /// Dispatcher wait before idle bookkeeping.
    pub dispatch_poll: Duration,
    /// Per-connection send deadline.
    pub send_timeout: Duration,
    /// Provider call deadline.
    pub snapshot_timeout: Duration,
    /// Queue depth that logs a warning.
    pub queue_warn_depth: usize,
    /// How long `stop()` waits for each worker before aborting it.
    pub shutdown_timeout: Duration,
    /// Trailing window for query throughput.
    pub query_window: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(2),
            dispatch_poll: Duration::from_secs(1),
            send_timeout: Duration::from_secs(2),
            snapshot_timeout: Duration::from_millis(1_500),
            queue_warn_depth: 1_000,
            shutdown_timeout: Duration::from_secs(5),
            query_window: Duration::from_secs(60),
        }
    }
}

/// Result of a lifecycle call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Workers spawned.
    Started,
    /// `start()` on a running hub; nothing changed.
    AlreadyRunning,
    /// Workers stopped and connections closed.
    Stopped,
    /// `stop()` on a stopped hub; nothing changed.
    NotRunning,
}

struct Workers {
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// The telemetry broadcast hub.
pub struct TelemetryHub {
    pub(crate) config: HubConfig,
    provider: Arc<dyn SnapshotProvider>,
    cache: Arc<SnapshotCache>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) queue: Arc<BroadcastQueue>,
    pub(crate) pipeline: Arc<PipelineTracker>,
    pub(crate) services: Arc<ServiceBoard>,
    workers: Mutex<Option<Workers>>,
    pub(crate) test_sequence: AtomicU64,
}

impl TelemetryHub {
    /// Hub over an arbitrary provider.
    ///
    /// The hub gets its own [`PipelineTracker`] and [`ServiceBoard`]; they
    /// only show up in broadcasts if `provider` reads them. Use
    /// [`TelemetryHub::with_system_provider`] to wire them through.
    pub fn new(config: HubConfig, provider: Arc<dyn SnapshotProvider>) -> Self {
        let pipeline = Arc::new(PipelineTracker::new(config.query_window));
        Self::assemble(config, provider, pipeline, Arc::new(ServiceBoard::new()))
    }

    /// Hub over the production provider, sharing its tracker and board.
    pub fn with_system_provider(config: HubConfig, provider: SystemSnapshotProvider) -> Self {
        let pipeline = provider.pipeline();
        let services = provider.services();
        Self::assemble(config, Arc::new(provider), pipeline, services)
    }

    fn assemble(
        config: HubConfig,
        provider: Arc<dyn SnapshotProvider>,
        pipeline: Arc<PipelineTracker>,
        services: Arc<ServiceBoard>,
    ) -> Self {
        let cache = Arc::new(SnapshotCache::new());
        let handshake = Handshake::new(
            Arc::clone(&provider),
            Arc::clone(&cache),
            config.snapshot_timeout,
        );
        let registry = Arc::new(ConnectionRegistry::new(handshake, config.send_timeout));
        let queue = Arc::new(BroadcastQueue::new(config.queue_warn_depth));
        Self {
            config,
            provider,
            cache,
            registry,
            queue,
            pipeline,
            services,
            workers: Mutex::new(None),
            test_sequence: AtomicU64::new(0),
        }
    }

    /// Spawn the sampler and dispatcher. No-op if already running.
    pub async fn start(&self) -> Transition {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            debug!("start ignored, hub already running");
            return Transition::AlreadyRunning;
        }

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.registry),
            self.config.dispatch_poll,
        );
        let sampler = Sampler::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.cache),
            Arc::clone(&self.registry),
            Arc::clone(&self.queue),
            self.config.sample_interval,
            self.config.snapshot_timeout,
        );
        *workers = Some(Workers {
            dispatcher: tokio::spawn(dispatcher.run(cancel.child_token())),
            sampler: tokio::spawn(sampler.run(cancel.child_token())),
            cancel,
        });
        info!(
            sample_interval_ms = self.config.sample_interval.as_millis(),
            "telemetry hub started"
        );
        Transition::Started
    }

    /// Cancel and await both workers, then close every connection.
    ///
    /// No-op if not running. Pending queued messages are discarded.
    pub async fn stop(&self) -> Transition {
        let Some(workers) = self.workers.lock().await.take() else {
            debug!("stop ignored, hub not running");
            return Transition::NotRunning;
        };

        workers.cancel.cancel();
        let deadline = self.config.shutdown_timeout;
        join_worker("sampler", workers.sampler, deadline).await;
        join_worker("dispatcher", workers.dispatcher, deadline).await;

        let closed = self.registry.close_all().await;
        let discarded = self.queue.clear().await;
        info!(closed, discarded, "telemetry hub stopped");
        Transition::Stopped
    }

    /// Whether workers are running.
    pub async fn is_running(&self) -> bool {
        self.workers.lock().await.is_some()
    }

    /// Whether the dispatcher task is running and has not exited.
    pub async fn dispatcher_alive(&self) -> bool {
        self.workers
            .lock()
            .await
            .as_ref()
            .is_some_and(|w| !w.dispatcher.is_finished())
    }

    /// Whether the sampler task is running and has not exited.
    pub async fn sampler_alive(&self) -> bool {
        self.workers
            .lock()
            .await
            .as_ref()
            .is_some_and(|w| !w.sampler.is_finished())
    }

    /// Register a client transport. Sends `initial_state` before returning.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> ConnectionId {
        self.registry.register(transport, None).await
    }

    /// Unregister a client. Unknown ids are a no-op.
    pub async fn disconnect(&self, id: &ConnectionId) -> bool {
        self.registry.unregister(id).await
    }

    /// Send one message to one client, outside the broadcast queue.
    pub async fn send_to(&self, id: &ConnectionId, envelope: &Envelope) -> bool {
        self.registry.send_to(id, envelope).await
    }

    /// Record inbound activity on a connection.
    pub async fn touch(&self, id: &ConnectionId) {
        self.registry.touch(id).await;
    }

    /// Registry stats.
    pub async fn stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    /// Registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Latest sampled snapshot, if any.
    pub fn latest_snapshot(&self) -> Option<MetricsSnapshot> {
        self.cache.latest()
    }

    /// When the latest snapshot was sampled.
    pub fn latest_snapshot_at(&self) -> Option<DateTime<Utc>> {
        self.cache.updated_at()
    }

    /// Messages waiting for the dispatcher.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Test broadcasts issued so far.
    pub fn test_sequence(&self) -> u64 {
        self.test_sequence.load(Ordering::Relaxed)
    }

    /// The registry, for transports that need direct access.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

async fn join_worker(name: &'static str, mut handle: JoinHandle<()>, deadline: Duration) {
    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(Ok(())) => debug!(worker = name, "worker exited"),
        Ok(Err(e)) if e.is_cancelled() => debug!(worker = name, "worker cancelled"),
        Ok(Err(e)) => warn!(worker = name, error = %e, "worker panicked"),
        Err(_) => {
            warn!(worker = name, timeout_ms = deadline.as_millis(), "worker did not stop in time, aborting");
            handle.abort();
            // The JoinError here is the abort we just requested.
            let _ = handle.await;
        }
    }
}
