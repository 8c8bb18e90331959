//! `PipewatchServer`: Axum HTTP + `WebSocket` server.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use pipewatch_hub::{RegistryStats, TelemetryHub};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::prometheus;
use crate::shutdown::ShutdownCoordinator;
use crate::status::{StatusResponse, build_status};
use crate::websocket::run_ws_session;

/// Status endpoint path.
pub const STATUS_PATH: &str = "/api/v1/metrics/status";
/// Test broadcast endpoint path.
pub const TEST_PATH: &str = "/api/v1/metrics/test";
/// Connection stats endpoint path.
pub const CONNECTIONS_PATH: &str = "/api/v1/metrics/connections";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The hub.
    pub hub: Arc<TelemetryHub>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Installed Prometheus recorder, if any.
    pub prometheus: Option<PrometheusHandle>,
    /// When the server was built.
    pub start_time: Instant,
}

/// Body of the test broadcast endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct TestBroadcastResponse {
    /// Whether a `test_message` was queued.
    pub queued: bool,
    /// Registered connections when the request was handled.
    pub active_connections: usize,
}

/// The pipewatch HTTP server.
pub struct PipewatchServer {
    config: Arc<ServerConfig>,
    hub: Arc<TelemetryHub>,
    prometheus: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl PipewatchServer {
    /// Server over an existing hub.
    pub fn new(config: ServerConfig, hub: Arc<TelemetryHub>) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            prometheus: None,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Render `/metrics` from this recorder.
    #[must_use]
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            config: Arc::clone(&self.config),
            prometheus: self.prometheus.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route(STATUS_PATH, get(status_handler))
            .route(TEST_PATH, get(test_handler).post(test_handler))
            .route(CONNECTIONS_PATH, get(connections_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until shutdown is requested.
    ///
    /// On shutdown the hub is stopped first, which closes every `WebSocket`
    /// session, so the graceful drain does not wait on open sockets.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, ws_path = %self.config.ws_path, "pipewatch server listening");

        let token = self.shutdown.token();
        let hub = Arc::clone(&self.hub);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                let _ = hub.stop().await;
            })
            .await
    }

    /// The hub.
    pub fn hub(&self) -> &Arc<TelemetryHub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The Prometheus handle, when a recorder was installed.
    pub fn prometheus(&self) -> Option<&PrometheusHandle> {
        self.prometheus.as_ref()
    }
}

/// GET `{ws_path}`
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let buffer = state.config.outbound_buffer;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, state.hub, buffer))
}

/// GET /api/v1/metrics/status
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(build_status(&state.hub).await)
}

/// GET|POST /api/v1/metrics/test
async fn test_handler(State(state): State<AppState>) -> (StatusCode, Json<TestBroadcastResponse>) {
    let queued = state.hub.broadcast_test("manual test broadcast").await;
    let code = if queued {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(TestBroadcastResponse {
            queued,
            active_connections: state.hub.connection_count(),
        }),
    )
}

/// GET /api/v1/metrics/connections
async fn connections_handler(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.hub.stats().await)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    prometheus::render(state.prometheus.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use pipewatch_hub::HubConfig;
    use pipewatch_hub::testing::{MockTransport, ScriptedProvider, host_snapshot};
    use tower::ServiceExt;

    fn make_server() -> PipewatchServer {
        let hub = TelemetryHub::new(
            HubConfig::default(),
            Arc::new(ScriptedProvider::new(host_snapshot(12.3, 40.1))),
        );
        PipewatchServer::new(ServerConfig::default(), Arc::new(hub))
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = call(server.router(), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn status_reports_degraded_when_stopped() {
        let server = make_server();
        let (status, body) = call(server.router(), Method::GET, STATUS_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["running"], false);
        assert_eq!(body["active_connections"], 0);
        assert!(body["metrics"].is_null());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn status_reports_ok_with_latest_metrics() {
        let server = make_server();
        let _ = server.hub().start().await;
        let _ = server.hub().connect(Arc::new(MockTransport::new())).await;
        // Let the sampler take its first sample.
        for _ in 0..50 {
            if server.hub().latest_snapshot().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let (status, body) = call(server.router(), Method::GET, STATUS_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["dispatcher_alive"], true);
        assert_eq!(body["sampler_alive"], true);
        assert!(body["metrics_updated_at"].is_string());
        assert_eq!(body["active_connections"], 1);
        assert_eq!(body["metrics"]["system_health"]["cpu"], 12.3);
        assert_eq!(body["metrics"]["connection_status"]["active_connections"], 1);
        let _ = server.hub().stop().await;
    }

    #[tokio::test]
    async fn test_endpoint_needs_running_hub() {
        let server = make_server();
        let (status, body) = call(server.router(), Method::POST, TEST_PATH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["queued"], false);

        let _ = server.hub().start().await;
        let (status, body) = call(server.router(), Method::GET, TEST_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queued"], true);
        let _ = server.hub().stop().await;
    }

    #[tokio::test]
    async fn connections_endpoint_lists_clients() {
        let server = make_server();
        let id = server.hub().connect(Arc::new(MockTransport::new())).await;
        let (status, body) = call(server.router(), Method::GET, CONNECTIONS_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_connections"], 1);
        assert_eq!(body["per_connection"][0]["id"], id.as_str());
        assert_eq!(body["per_connection"][0]["messages_sent"], 1);
    }

    #[tokio::test]
    async fn metrics_endpoint_without_recorder_is_empty() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn ws_path_rejects_plain_get() {
        let server = make_server();
        let req = Request::builder()
            .uri("/api/v1/ws/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = call(server.router(), Method::GET, "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }
}
