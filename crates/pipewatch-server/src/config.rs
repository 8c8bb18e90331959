//! Server configuration.

use std::time::Duration;

use pipewatch_hub::HubConfig;
use pipewatch_settings::{HubSettings, ServerSettings};
use serde::{Deserialize, Serialize};

/// Listener and `WebSocket` settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Versioned `WebSocket` path.
    pub ws_path: String,
    /// Frames buffered per client before sends fail.
    pub outbound_buffer: usize,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            ws_path: s.ws_path.clone(),
            outbound_buffer: s.outbound_buffer,
            max_message_size: s.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Hub timings from settings. Zero durations become one millisecond (one
/// second for the query window).
pub fn hub_config(s: &HubSettings) -> HubConfig {
    let millis = |ms: u64| Duration::from_millis(ms.max(1));
    HubConfig {
        sample_interval: millis(s.sample_interval_ms),
        dispatch_poll: millis(s.dispatch_poll_ms),
        send_timeout: millis(s.send_timeout_ms),
        snapshot_timeout: millis(s.snapshot_timeout_ms),
        queue_warn_depth: s.queue_warn_depth.max(1),
        shutdown_timeout: millis(s.shutdown_timeout_ms),
        query_window: Duration::from_secs(s.query_window_secs.max(1)),
    }
}
