//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only
//! needs to mention the keys it changes.

use serde::{Deserialize, Serialize};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipewatchSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Sampler, dispatcher and registry tuning.
    pub hub: HubSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Versioned WebSocket path.
    pub ws_path: String,
    /// Frames buffered per client before sends fail with backpressure.
    pub outbound_buffer: usize,
    /// Largest accepted inbound frame, bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            ws_path: "/api/v1/ws/metrics".into(),
            outbound_buffer: 256,
            max_message_size: 64 * 1024,
        }
    }
}

/// Hub tuning. Durations are in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Sampler cadence.
    pub sample_interval_ms: u64,
    /// Dispatcher dequeue wait before idle bookkeeping.
    pub dispatch_poll_ms: u64,
    /// Per-connection send deadline.
    pub send_timeout_ms: u64,
    /// Deadline for a synchronous snapshot during the handshake and sampling.
    pub snapshot_timeout_ms: u64,
    /// Queue depth that triggers a warning.
    pub queue_warn_depth: usize,
    /// How long `stop()` waits for workers before aborting them.
    pub shutdown_timeout_ms: u64,
    /// Trailing window for query throughput figures, seconds.
    pub query_window_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 2_000,
            dispatch_poll_ms: 1_000,
            send_timeout_ms: 2_000,
            snapshot_timeout_ms: 1_500,
            queue_warn_depth: 1_000,
            shutdown_timeout_ms: 5_000,
            query_window_secs: 60,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
