//! Operator status report.
//!
//! Always answers: a stopped hub or a dead dispatcher is reported as
//! `degraded`, never as an error.

use chrono::{DateTime, Utc};
use pipewatch_core::MetricsSnapshot;
use pipewatch_hub::TelemetryHub;
use serde::Serialize;

/// `"ok"` or `"degraded"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubHealth {
    /// Sampler and dispatcher running.
    Ok,
    /// Hub stopped, or a worker exited.
    Degraded,
}

/// Body of `GET /api/v1/metrics/status`.
#[derive(Clone, Debug, Serialize)]
pub struct StatusResponse {
    /// Overall state.
    pub status: HubHealth,
    /// Whether the hub's workers are running.
    pub running: bool,
    /// Whether the dispatcher task is alive.
    pub dispatcher_alive: bool,
    /// Whether the sampler task is alive.
    pub sampler_alive: bool,
    /// Registered connections.
    pub active_connections: usize,
    /// Frames delivered since start.
    pub total_messages_sent: u64,
    /// Failed sends since start.
    pub failed_sends: u64,
    /// Messages waiting for dispatch.
    pub queue_depth: usize,
    /// Latest sampled snapshot, `null` before the first sample.
    pub metrics: Option<MetricsSnapshot>,
    /// When `metrics` was sampled. Provider failures do not advance it.
    pub metrics_updated_at: Option<DateTime<Utc>>,
    /// When this report was built.
    pub timestamp: DateTime<Utc>,
}

/// Build the status report.
pub async fn build_status(hub: &TelemetryHub) -> StatusResponse {
    let running = hub.is_running().await;
    let dispatcher_alive = hub.dispatcher_alive().await;
    let sampler_alive = hub.sampler_alive().await;
    let stats = hub.stats().await;
    let status = if running && dispatcher_alive && sampler_alive {
        HubHealth::Ok
    } else {
        HubHealth::Degraded
    };
    StatusResponse {
        status,
        running,
        dispatcher_alive,
        sampler_alive,
        active_connections: stats.active_connections,
        total_messages_sent: stats.total_messages_sent,
        failed_sends: stats.failed_sends,
        queue_depth: hub.queue_depth(),
        metrics: hub
            .latest_snapshot()
            .map(|s| s.with_active_connections(stats.active_connections)),
        metrics_updated_at: hub.latest_snapshot_at(),
        timestamp: Utc::now(),
    }
}
