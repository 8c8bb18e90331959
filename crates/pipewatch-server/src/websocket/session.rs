//! One client session from upgrade to disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use pipewatch_core::{ConnectionEstablished, Envelope, HubMessage, ProtocolError};
use pipewatch_hub::metrics::INBOUND_IGNORED_TOTAL;
use pipewatch_hub::{ChannelTransport, Outbound, OutboundReceiver, TelemetryHub, Transport};
use tracing::{debug, info, instrument};

/// Liveness ping sent by clients.
pub const PING: &str = "ping";
/// Reply to [`PING`].
pub const PONG: &str = "pong";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a session until the client leaves or the hub closes it.
///
/// 1. Start the writer task so queued frames can flow
/// 2. Register with the hub, which sends `initial_state`
/// 3. Send `connection_established`
/// 4. Answer `"ping"` with `"pong"`; ignore everything else
/// 5. Unregister on close, error, or hub-initiated close
#[instrument(skip_all)]
pub async fn run_ws_session(ws: WebSocket, hub: Arc<TelemetryHub>, outbound_buffer: usize) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (transport, out_rx) = ChannelTransport::new(outbound_buffer);
    let transport = Arc::new(transport);
    let mut writer = tokio::spawn(write_frames(ws_tx, out_rx));

    let conn_id = hub.connect(transport.clone()).await;
    let ack = Envelope::new(HubMessage::ConnectionEstablished(ConnectionEstablished {
        connection_id: conn_id.clone(),
        sample_interval_ms: u64::try_from(hub.config().sample_interval.as_millis())
            .unwrap_or(u64::MAX),
    }));
    let _ = hub.send_to(&conn_id, &ack).await;

    loop {
        let frame = tokio::select! {
            _ = &mut writer => {
                debug!(conn_id = %conn_id, "writer finished, ending session");
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "socket read failed");
                break;
            }
            None => break,
        };
        hub.touch(&conn_id).await;

        let ignored = match msg {
            Message::Text(text) if text.as_str() == PING => {
                let _ = transport.send(Arc::from(PONG)).await;
                None
            }
            Message::Text(text) => Some(ProtocolError::UnexpectedText {
                len: text.as_str().len(),
            }),
            Message::Binary(data) => {
                debug!(conn_id = %conn_id, len = data.len(), "binary frame");
                Some(ProtocolError::UnsupportedFrame { kind: "binary" })
            }
            Message::Close(_) => {
                info!(conn_id = %conn_id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => None,
        };
        if let Some(e) = ignored {
            counter!(INBOUND_IGNORED_TOTAL).increment(1);
            debug!(conn_id = %conn_id, error = %e, "ignoring inbound frame");
        }
    }

    let _ = hub.disconnect(&conn_id).await;
    writer.abort();
    info!(conn_id = %conn_id, "session ended");
}

async fn write_frames(mut ws_tx: SplitSink<WebSocket, Message>, mut rx: OutboundReceiver) {
    let closed = rx.close_signal();
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(text) => {
                let sent = tokio::select! {
                    biased;
                    () = closed.cancelled() => break,
                    sent = ws_tx.send(Message::Text(text.to_string().into())) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    // A peer that stopped reading must not hold the close forever.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.send(Message::Close(None))).await;
}
