//! Connection registry.
//!
//! The only owner of transport handles. Every mutation goes through the
//! write lock, and the active count is updated under that same lock so
//! `count()` and `stats()` never disagree with the map. A connection is
//! marked closed before it leaves the map, so a dispatch pass working from
//! an older snapshot cannot deliver to it afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge};
use pipewatch_core::{ConnectionId, Envelope, HubMessage, TransportError};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionInfo};
use crate::handshake::Handshake;
use crate::metrics::{
    CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL, SEND_FAILURES_TOTAL,
};
use crate::transport::Transport;

/// Registry-wide counters plus one entry per connection.
#[derive(Clone, Debug, Serialize)]
pub struct RegistryStats {
    /// Registered connections.
    pub active_connections: usize,
    /// Frames delivered since start, across all connections ever registered.
    pub total_messages_sent: u64,
    /// Failed sends since start.
    pub failed_sends: u64,
    /// Per-connection metadata.
    pub per_connection: Vec<ConnectionInfo>,
}

/// Tracks every live dashboard connection.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    active_count: AtomicUsize,
    epoch: AtomicU64,
    handshake: Handshake,
    send_timeout: Duration,
    total_messages_sent: AtomicU64,
    failed_sends: AtomicU64,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new(handshake: Handshake, send_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            handshake,
            send_timeout,
            total_messages_sent: AtomicU64::new(0),
            failed_sends: AtomicU64::new(0),
        }
    }

    /// Register a transport and send it an `initial_state`.
    ///
    /// A fresh id is generated unless one is supplied; a supplied id that is
    /// already registered replaces the old connection, whose transport is
    /// closed. The initial state is sent before the connection becomes
    /// visible to the dispatcher, so it is always the first frame the client
    /// sees. A failed initial send is logged and the connection stays
    /// registered. A [`close_all`](Self::close_all) that lands during the
    /// handshake wins: the transport is closed and nothing is inserted.
    pub async fn register(
        &self,
        transport: Arc<dyn Transport>,
        id: Option<ConnectionId>,
    ) -> ConnectionId {
        let id = id.unwrap_or_default();
        let epoch = self.epoch.load(Ordering::Acquire);
        if self.unregister(&id).await {
            debug!(conn_id = %id, "replaced connection with reused id");
        }

        let conn = Arc::new(Connection::new(id.clone(), transport));
        let state = self.handshake.initial_state(self.count() + 1).await;
        let envelope = Envelope::new(HubMessage::InitialState(state));
        if let Err(e) = self.deliver_envelope(&conn, &envelope).await {
            warn!(conn_id = %id, error = %e, "initial state not delivered, keeping connection");
        }

        let inserted = {
            let mut conns = self.connections.write().await;
            if self.epoch.load(Ordering::Acquire) == epoch {
                let stale = conns.insert(id.clone(), Arc::clone(&conn));
                if let Some(stale) = &stale {
                    let _ = stale.mark_closed();
                } else {
                    let _ = self.active_count.fetch_add(1, Ordering::AcqRel);
                }
                Some((stale, conns.len()))
            } else {
                let _ = conn.mark_closed();
                None
            }
        };

        let Some((stale, active)) = inserted else {
            conn.close_transport().await;
            info!(conn_id = %id, "registry closed during handshake, connection dropped");
            return id;
        };
        if let Some(stale) = stale {
            stale.close_transport().await;
            debug!(conn_id = %id, "closed transport of replaced connection");
        }
        counter!(CONNECTIONS_TOTAL).increment(1);
        record_active(active);
        info!(conn_id = %id, active, "connection registered");
        id
    }

    /// Remove a connection and close its transport. Unknown ids are a no-op.
    ///
    /// Returns whether an entry was removed.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut conns = self.connections.write().await;
            let removed = conns.remove(id);
            if let Some(conn) = &removed {
                self.retire_locked(conn);
            }
            removed.map(|c| (c, conns.len()))
        };
        let Some((conn, active)) = removed else {
            return false;
        };
        conn.close_transport().await;
        record_active(active);
        info!(conn_id = %id, active, "connection unregistered");
        true
    }

    /// Remove many connections under one write lock.
    pub async fn remove_batch(&self, ids: &[ConnectionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let (removed, active) = {
            let mut conns = self.connections.write().await;
            let removed: Vec<Arc<Connection>> =
                ids.iter().filter_map(|id| conns.remove(id)).collect();
            for conn in &removed {
                self.retire_locked(conn);
            }
            (removed, conns.len())
        };
        let _ = join_all(removed.iter().map(|c| c.close_transport())).await;
        record_active(active);
        for conn in &removed {
            info!(conn_id = %conn.id, active, "connection removed after failed send");
        }
        removed.len()
    }

    /// Close and remove every connection.
    ///
    /// Registrations still in their handshake are dropped rather than
    /// inserted afterwards.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut conns = self.connections.write().await;
            let _ = self.epoch.fetch_add(1, Ordering::AcqRel);
            let drained: Vec<_> = conns.drain().map(|(_, c)| c).collect();
            for conn in &drained {
                self.retire_locked(conn);
            }
            drained
        };
        let _ = join_all(drained.iter().map(|c| c.close_transport())).await;
        record_active(0);
        if !drained.is_empty() {
            info!(closed = drained.len(), "closed all connections");
        }
        drained.len()
    }

    /// Remove connections whose transport reports the peer gone.
    pub async fn prune_closed(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .snapshot()
            .await
            .iter()
            .filter(|c| c.transport_closed())
            .map(|c| c.id.clone())
            .collect();
        if dead.is_empty() {
            return 0;
        }
        debug!(count = dead.len(), "pruning closed transports");
        self.remove_batch(&dead).await
    }

    /// Send one message to one connection. A failed send unregisters it.
    ///
    /// Returns whether the frame was delivered.
    pub async fn send_to(&self, id: &ConnectionId, envelope: &Envelope) -> bool {
        let Some(conn) = self.get(id).await else {
            debug!(conn_id = %id, message_type = %envelope.message_type(), "send to unknown connection");
            return false;
        };
        if self.deliver_envelope(&conn, envelope).await.is_ok() {
            true
        } else {
            let _ = self.unregister(id).await;
            false
        }
    }

    /// Deliver a pre-serialized frame to `conn`, recording the outcome.
    pub async fn deliver(&self, conn: &Connection, frame: Arc<str>) -> Result<(), TransportError> {
        match conn.deliver(frame, self.send_timeout).await {
            Ok(()) => {
                let _ = self.total_messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                let _ = self.failed_sends.fetch_add(1, Ordering::Relaxed);
                counter!(SEND_FAILURES_TOTAL).increment(1);
                warn!(conn_id = %conn.id, error = %e, "send failed");
                Err(e)
            }
        }
    }

    async fn deliver_envelope(
        &self,
        conn: &Connection,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        let frame = envelope.to_frame().map_err(|e| {
            warn!(message_type = %envelope.message_type(), error = %e, "failed to serialize message");
            TransportError::Io(e.to_string())
        })?;
        self.deliver(conn, Arc::from(frame)).await
    }

    /// Look up one connection.
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Copy of the current connection set.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Record inbound activity.
    pub async fn touch(&self, id: &ConnectionId) {
        if let Some(conn) = self.get(id).await {
            conn.touch();
        }
    }

    /// Registered connections.
    pub fn count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Frames delivered since start.
    pub fn total_messages_sent(&self) -> u64 {
        self.total_messages_sent.load(Ordering::Relaxed)
    }

    /// Failed sends since start.
    pub fn failed_sends(&self) -> u64 {
        self.failed_sends.load(Ordering::Relaxed)
    }

    /// Counters plus per-connection metadata.
    pub async fn stats(&self) -> RegistryStats {
        let conns = self.connections.read().await;
        let mut per_connection: Vec<ConnectionInfo> = conns.values().map(|c| c.info()).collect();
        per_connection.sort_by_key(|info| info.connected_at);
        RegistryStats {
            active_connections: conns.len(),
            total_messages_sent: self.total_messages_sent(),
            failed_sends: self.failed_sends(),
            per_connection,
        }
    }

    fn retire_locked(&self, conn: &Connection) {
        let _ = conn.mark_closed();
        let _ = self.active_count.fetch_sub(1, Ordering::AcqRel);
        counter!(DISCONNECTIONS_TOTAL).increment(1);
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(active: usize) {
    gauge!(CONNECTIONS_ACTIVE).set(active as f64);
}
