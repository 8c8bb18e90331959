//! End-to-end tests over a real listener with a real `WebSocket` client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pipewatch_hub::testing::{ScriptedProvider, host_snapshot};
use pipewatch_hub::{HubConfig, TelemetryHub};
use pipewatch_server::{PipewatchServer, ServerConfig};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    base: String,
    ws_url: String,
    server: Arc<PipewatchServer>,
    provider: Arc<ScriptedProvider>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn boot(sample_interval: Duration) -> Self {
        let provider = Arc::new(ScriptedProvider::new(host_snapshot(12.3, 40.1)));
        let config = HubConfig {
            sample_interval,
            dispatch_poll: Duration::from_millis(50),
            ..HubConfig::default()
        };
        let hub = Arc::new(TelemetryHub::new(config, provider.clone()));
        let server_config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let ws_path = server_config.ws_path.clone();
        let server = Arc::new(PipewatchServer::new(server_config, hub));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };
        Self {
            base: format!("http://{addr}"),
            ws_url: format!("ws://{addr}{ws_path}"),
            server,
            provider,
            handle,
        }
    }

    fn hub(&self) -> &Arc<TelemetryHub> {
        self.server.hub()
    }

    async fn connect(&self) -> WsStream {
        let (ws, _) = connect_async(self.ws_url.as_str()).await.unwrap();
        ws
    }

    async fn shutdown(self) {
        self.server.shutdown().shutdown();
        timeout(TIMEOUT, self.handle).await.unwrap().unwrap().unwrap();
    }
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

async fn next_json(ws: &mut WsStream) -> Value {
    let text = next_text(ws).await;
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("not JSON ({e}): {text}"))
}

/// Skip frames until one of type `kind` arrives.
async fn next_of_type(ws: &mut WsStream, kind: &str) -> Value {
    loop {
        let text = next_text(ws).await;
        if let Ok(frame) = serde_json::from_str::<Value>(&text) {
            if frame["type"] == kind {
                return frame;
            }
        }
    }
}

async fn wait_for_connections(hub: &TelemetryHub, expected: usize) {
    timeout(TIMEOUT, async {
        while hub.connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("connection count never reached {expected}"));
}

#[tokio::test]
async fn handshake_sends_initial_state_then_ack() {
    let ts = TestServer::boot(Duration::from_secs(3_600)).await;
    let mut ws = ts.connect().await;

    let initial = next_json(&mut ws).await;
    assert_eq!(initial["type"], "initial_state");
    assert!(initial["timestamp"].is_string());
    let stages = initial["data"]["pipeline"]["stages"].as_array().unwrap();
    let ids: Vec<&str> = stages.iter().map(|s| s["id"].as_str().unwrap()).collect();
    let declared: Vec<&str> = pipewatch_core::stages::STAGE_DEFINITIONS
        .iter()
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(ids, declared);
    assert!(stages.iter().all(|s| s["status"] == "idle"));
    for edge in initial["data"]["pipeline"]["edges"].as_array().unwrap() {
        assert!(declared.contains(&edge["from"].as_str().unwrap()));
        assert!(declared.contains(&edge["to"].as_str().unwrap()));
        assert_eq!(edge["active"], false);
    }
    assert_eq!(initial["data"]["system_metrics"]["system_health"]["cpu"], 12.3);

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "connection_established");
    assert!(ack["data"]["connection_id"].as_str().unwrap().starts_with("conn_"));
    assert_eq!(ack["data"]["sample_interval_ms"], 3_600_000);

    ts.shutdown().await;
}

#[tokio::test]
async fn ping_gets_exactly_one_pong_and_other_frames_are_ignored() {
    // Hub not started: no broadcasts can interleave with the replies.
    let ts = TestServer::boot(Duration::from_secs(3_600)).await;
    let mut ws = ts.connect().await;
    let _ = next_of_type(&mut ws, "connection_established").await;

    ws.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "pong");

    ws.send(Message::text("{\"subscribe\":\"everything\"}")).await.unwrap();
    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    ws.send(Message::text("ping")).await.unwrap();
    // The ignored frames produce nothing, so the next frame is the second pong.
    assert_eq!(next_text(&mut ws).await, "pong");
    assert_eq!(ts.hub().connection_count(), 1);

    ts.shutdown().await;
}

#[tokio::test]
async fn sampler_broadcasts_mocked_metrics() {
    let ts = TestServer::boot(Duration::from_millis(200)).await;
    let mut a = ts.connect().await;
    let _ = next_of_type(&mut a, "connection_established").await;
    let _ = ts.hub().start().await;

    let update = next_of_type(&mut a, "metrics_update").await;
    assert_eq!(update["data"]["system_health"]["cpu"], 12.3);
    assert_eq!(update["data"]["system_health"]["memory"], 40.1);
    assert_eq!(update["data"]["connection_status"]["active_connections"], 1);

    // B joins mid-interval and gets its own initial state immediately.
    let mut b = ts.connect().await;
    let first = next_json(&mut b).await;
    assert_eq!(first["type"], "initial_state");

    // A failing tick still yields an update built from the last good sample.
    ts.provider.push(Err(pipewatch_core::ProviderError::collector("host", "sensor gone")));
    let calls = ts.provider.calls();
    let mut seen = 0;
    while ts.provider.calls() < calls + 2 || seen < 2 {
        let update = next_of_type(&mut a, "metrics_update").await;
        assert_eq!(update["data"]["system_health"]["cpu"], 12.3);
        seen += 1;
    }
    wait_for_connections(ts.hub(), 2).await;

    ts.shutdown().await;
}

#[tokio::test]
async fn test_endpoint_fans_out_to_every_client() {
    let ts = TestServer::boot(Duration::from_secs(3_600)).await;
    let _ = ts.hub().start().await;
    let mut a = ts.connect().await;
    let mut b = ts.connect().await;
    let _ = next_of_type(&mut a, "connection_established").await;
    let _ = next_of_type(&mut b, "connection_established").await;
    wait_for_connections(ts.hub(), 2).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/v1/metrics/test", ts.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["queued"], true);
    assert_eq!(body["active_connections"], 2);

    for ws in [&mut a, &mut b] {
        let msg = next_of_type(ws, "test_message").await;
        assert_eq!(msg["data"]["sequence"], 1);
    }

    ts.shutdown().await;
}

#[tokio::test]
async fn status_endpoint_tracks_lifecycle() {
    let ts = TestServer::boot(Duration::from_millis(100)).await;
    let url = format!("{}/api/v1/metrics/status", ts.base);

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["running"], false);

    let _ = ts.hub().start().await;
    let mut ws = ts.connect().await;
    let _ = next_of_type(&mut ws, "metrics_update").await;

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_connections"], 1);
    assert_eq!(body["metrics"]["system_health"]["memory"], 40.1);

    let _ = ts.hub().stop().await;
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["active_connections"], 0);

    ts.shutdown().await;
}

#[tokio::test]
async fn client_close_unregisters() {
    let ts = TestServer::boot(Duration::from_secs(3_600)).await;
    let mut ws = ts.connect().await;
    let _ = next_of_type(&mut ws, "connection_established").await;
    wait_for_connections(ts.hub(), 1).await;

    ws.close(None).await.unwrap();
    wait_for_connections(ts.hub(), 0).await;

    let body: Value = reqwest::get(format!("{}/api/v1/metrics/connections", ts.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["active_connections"], 0);
    assert!(body["per_connection"].as_array().unwrap().is_empty());

    ts.shutdown().await;
}

#[tokio::test]
async fn hub_stop_closes_open_sockets() {
    let ts = TestServer::boot(Duration::from_millis(100)).await;
    let _ = ts.hub().start().await;
    let mut ws = ts.connect().await;
    let _ = next_of_type(&mut ws, "connection_established").await;

    let _ = ts.hub().stop().await;
    assert_eq!(ts.hub().connection_count(), 0);

    let closed = timeout(TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => {}
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);

    ts.shutdown().await;
}
