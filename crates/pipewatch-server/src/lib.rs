//! # pipewatch-server
//!
//! Axum HTTP + `WebSocket` surface over a [`pipewatch_hub::TelemetryHub`].
//!
//! - `WebSocket` gateway at a versioned path: one session per client,
//!   `"ping"` → `"pong"`, everything else ignored
//! - Operator endpoints: status, test broadcast, connection stats, health
//! - Prometheus rendering at `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod prometheus;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod websocket;

pub use config::{ServerConfig, hub_config};
pub use server::{AppState, PipewatchServer};
pub use shutdown::ShutdownCoordinator;
