//! Point-in-time metrics reading broadcast as `metrics_update`.

use serde::{Deserialize, Serialize};

/// Host-level health figures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Global CPU utilisation, percent.
    pub cpu: f64,
    /// Memory in use, percent of total.
    pub memory: f64,
    /// Memory still available, GiB.
    pub memory_available: f64,
}

/// One GPU as reported by the driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuReading {
    /// Utilisation, percent.
    pub utilization: f64,
    /// Memory in use, MiB.
    pub memory_used: f64,
    /// Total memory, MiB.
    pub memory_total: f64,
    /// Core temperature, degrees Celsius.
    pub temperature: f64,
}

/// Query pipeline throughput figures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// Queries completed within the trailing minute.
    pub queries_per_minute: f64,
    /// Mean response time of those queries, milliseconds.
    pub avg_response_time: f64,
    /// Queries started but not yet finished.
    pub active_queries: u64,
}

/// Reachability of a collaborator service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Reachable and answering.
    Online,
    /// Known to be down.
    Offline,
    /// Never reported.
    #[default]
    Unknown,
}

/// Connectivity block of a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Dashboard connections registered when the snapshot was stamped.
    pub active_connections: usize,
    /// API backend status.
    pub backend: ServiceStatus,
    /// Relational database status.
    pub database: ServiceStatus,
    /// Vector database status.
    pub vector_db: ServiceStatus,
}

/// Complete metrics reading.
///
/// `Default` is the zeroed snapshot used when no live data is available.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Host health.
    pub system_health: SystemHealth,
    /// Per-GPU readings; empty on hosts without a GPU.
    pub gpu_performance: Vec<GpuReading>,
    /// Query pipeline figures.
    pub pipeline_status: PipelineStatus,
    /// Connectivity figures.
    pub connection_status: ConnectionStatus,
}

impl MetricsSnapshot {
    /// Zeroed snapshot.
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Overwrite the connection count with the registry's live size.
    #[must_use]
    pub fn with_active_connections(mut self, count: usize) -> Self {
        self.connection_status.active_connections = count;
        self
    }
}
