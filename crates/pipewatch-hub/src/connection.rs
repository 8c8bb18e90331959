//! Per-connection state owned by the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pipewatch_core::{ConnectionId, TransportError};
use serde::Serialize;

use crate::transport::Transport;

/// One registered dashboard client.
pub struct Connection {
    /// Unique id.
    pub id: ConnectionId,
    transport: Arc<dyn Transport>,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
    messages_sent: AtomicU64,
    open: AtomicBool,
}

impl Connection {
    /// Wrap a transport. Starts open with `last_activity = now`.
    pub fn new(id: ConnectionId, transport: Arc<dyn Transport>) -> Self {
        let now = Utc::now();
        Self {
            id,
            transport,
            connected_at: now,
            last_activity: Mutex::new(now),
            messages_sent: AtomicU64::new(0),
            open: AtomicBool::new(true),
        }
    }

    /// Send one frame, bounded by `deadline`.
    ///
    /// A connection that has been marked closed refuses to send.
    pub async fn deliver(&self, frame: Arc<str>, deadline: Duration) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        match tokio::time::timeout(deadline, self.transport.send(frame)).await {
            Ok(Ok(())) => {
                let _ = self.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.touch();
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout(deadline)),
        }
    }

    /// Record activity (a send or an inbound frame).
    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    /// Stop all further sends. Returns `true` on the first call.
    pub fn mark_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Whether sends are still allowed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether the transport reports the peer gone.
    pub fn transport_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Best-effort close of the underlying transport.
    pub async fn close_transport(&self) {
        self.transport.close().await;
    }

    /// Frames delivered so far.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Last send or inbound frame.
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    /// Serializable view for stats.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity(),
            messages_sent: self.messages_sent(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("messages_sent", &self.messages_sent())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Per-connection entry of [`crate::RegistryStats`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Connection id.
    pub id: ConnectionId,
    /// Accept time.
    pub connected_at: DateTime<Utc>,
    /// Last send or inbound frame.
    pub last_activity: DateTime<Utc>,
    /// Frames delivered.
    pub messages_sent: u64,
}
