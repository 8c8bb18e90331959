//! Snapshot providers.
//!
//! A [`SnapshotProvider`] produces one [`MetricsSnapshot`] on demand. The
//! production provider, [`SystemSnapshotProvider`], composes four
//! sub-collectors: host health via `sysinfo`, GPU readings via
//! `nvidia-smi`, query throughput from a [`PipelineTracker`] and
//! collaborator reachability from a [`ServiceBoard`].

mod cache;
mod gpu;
mod host;
mod pipeline;
mod services;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipewatch_core::{ConnectionStatus, MetricsSnapshot, ProviderError};
use tracing::debug;

pub use cache::SnapshotCache;
pub use gpu::{GpuCollector, parse_nvidia_smi};
pub use host::HostCollector;
pub use pipeline::PipelineTracker;
pub use services::{Service, ServiceBoard};

/// Source of point-in-time metrics.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Produce a fresh snapshot.
    async fn snapshot(&self) -> Result<MetricsSnapshot, ProviderError>;
}

/// Call `provider` with a deadline.
pub async fn fetch_snapshot(
    provider: &dyn SnapshotProvider,
    deadline: Duration,
) -> Result<MetricsSnapshot, ProviderError> {
    match tokio::time::timeout(deadline, provider.snapshot()).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(deadline)),
    }
}

/// Production provider combining every sub-collector.
///
/// Host sampling failure fails the whole snapshot. GPU failure degrades to
/// an empty GPU list, since hosts without a GPU are normal.
pub struct SystemSnapshotProvider {
    host: HostCollector,
    gpu: GpuCollector,
    pipeline: Arc<PipelineTracker>,
    services: Arc<ServiceBoard>,
}

impl SystemSnapshotProvider {
    /// Assemble from parts.
    pub fn new(
        host: HostCollector,
        gpu: GpuCollector,
        pipeline: Arc<PipelineTracker>,
        services: Arc<ServiceBoard>,
    ) -> Self {
        Self {
            host,
            gpu,
            pipeline,
            services,
        }
    }

    /// Fresh host sampler, `nvidia-smi` from `PATH`, and a query tracker
    /// over `query_window`.
    pub fn with_defaults(query_window: Duration) -> Self {
        Self::new(
            HostCollector::new(),
            GpuCollector::default(),
            Arc::new(PipelineTracker::new(query_window)),
            Arc::new(ServiceBoard::new()),
        )
    }

    /// Tracker fed by query start/finish notifications.
    pub fn pipeline(&self) -> Arc<PipelineTracker> {
        Arc::clone(&self.pipeline)
    }

    /// Board fed by service status notifications.
    pub fn services(&self) -> Arc<ServiceBoard> {
        Arc::clone(&self.services)
    }
}

#[async_trait]
impl SnapshotProvider for SystemSnapshotProvider {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn snapshot(&self) -> Result<MetricsSnapshot, ProviderError> {
        let (host, gpus) = tokio::join!(self.host.sample(), self.gpu.sample());
        let system_health = host?;
        let gpu_performance = gpus.unwrap_or_else(|e| {
            debug!(error = %e, "gpu sample unavailable");
            Vec::new()
        });
        let services = self.services.current();
        Ok(MetricsSnapshot {
            system_health,
            gpu_performance,
            pipeline_status: self.pipeline.status(),
            connection_status: ConnectionStatus {
                active_connections: 0,
                backend: services.backend,
                database: services.database,
                vector_db: services.vector_db,
            },
        })
    }
}
