//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` whenever the process is serving HTTP.
    pub status: String,
    /// Seconds since the server was built.
    pub uptime_secs: u64,
    /// Registered dashboard connections.
    pub connections: usize,
}

/// Build a health response.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}
