//! # pipewatch
//!
//! Telemetry hub binary: loads settings, starts the hub workers and serves
//! the HTTP/WebSocket surface until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pipewatch_hub::{SystemSnapshotProvider, TelemetryHub};
use pipewatch_server::{PipewatchServer, ServerConfig, hub_config, prometheus};
use pipewatch_settings::PipewatchSettings;
use tokio::net::TcpListener;

/// Pipewatch telemetry hub.
#[derive(Parser, Debug)]
#[command(name = "pipewatch", about = "Real-time pipeline telemetry hub")]
struct Cli {
    /// Settings file (defaults to `~/.pipewatch/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter, e.g. `info` or `pipewatch_hub=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<PipewatchSettings> {
        let mut settings = match &self.config {
            Some(path) => pipewatch_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => pipewatch_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

/// Install the metrics recorder, start the hub and build the server.
///
/// The recorder goes first so the sampler's first tick is recorded.
async fn launch(settings: &PipewatchSettings) -> Arc<PipewatchServer> {
    let recorder = match prometheus::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder unavailable, /metrics disabled");
            None
        }
    };

    let hub_config = hub_config(&settings.hub);
    let provider = SystemSnapshotProvider::with_defaults(hub_config.query_window);
    let hub = Arc::new(TelemetryHub::with_system_provider(hub_config, provider));
    let _ = hub.start().await;

    let mut server = PipewatchServer::new(ServerConfig::from(&settings.server), hub);
    if let Some(handle) = recorder {
        server = server.with_prometheus(handle);
    }
    Arc::new(server)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    pipewatch_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let server = launch(&settings).await;
    let hub = Arc::clone(server.hub());

    let addr = server.config().bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let shutdown = Arc::clone(server.shutdown());
    let _signal = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutting down...");
        shutdown.shutdown();
    });

    server.serve(listener).await.context("Server error")?;

    // serve() already stops the hub on graceful shutdown; this covers an early exit.
    let _ = hub.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["pipewatch"]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn cli_overrides_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"host": "10.0.0.1", "port": 9100}, "logging": {"level": "warn"}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "pipewatch",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9200",
            "--json",
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.host, "10.0.0.1");
        assert_eq!(settings.server.port, 9200);
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.logging.json);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let cli = Cli::parse_from(["pipewatch", "--config", path.to_str().unwrap()]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.ws_path, "/api/v1/ws/metrics");
    }

    #[tokio::test]
    async fn launch_records_the_first_sample() {
        let mut settings = PipewatchSettings::default();
        settings.hub.sample_interval_ms = 3_600_000;
        let server = launch(&settings).await;
        assert!(server.hub().is_running().await);

        let handle = server.prometheus().expect("recorder installed");
        let recorded = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                if handle.render().contains("hub_messages_enqueued_total") {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await;
        let _ = server.hub().stop().await;
        assert!(recorded.is_ok(), "first sample was not recorded");
    }
}
