//! The seam between the hub and a concrete client connection.
//!
//! The registry only ever talks to a `dyn Transport`. The server crate backs
//! it with a [`ChannelTransport`] feeding a per-socket writer task, and tests
//! back it with [`crate::testing::MockTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use pipewatch_core::TransportError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outbound half of one client connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one serialized frame.
    async fn send(&self, frame: Arc<str>) -> Result<(), TransportError>;

    /// Best-effort close. Never fails.
    async fn close(&self);

    /// Whether the peer is known to be gone.
    fn is_closed(&self) -> bool;
}

/// Item consumed by a socket writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Frame(Arc<str>),
    /// Send a close frame and stop writing.
    Close,
}

/// [`Transport`] over a bounded channel drained by a writer task.
///
/// Sends never wait: a full buffer is reported as
/// [`TransportError::Backpressure`] so one slow client cannot hold up a
/// dispatch pass. Closing goes through a separate token, so a full buffer
/// cannot swallow the close.
pub struct ChannelTransport {
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

impl ChannelTransport {
    /// Create a transport and the receiver its writer task drains.
    pub fn new(buffer: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let closed = CancellationToken::new();
        let receiver = OutboundReceiver {
            rx,
            closed: closed.clone(),
            done: false,
        };
        (Self { tx, closed }, receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Arc<str>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.tx.try_send(Outbound::Frame(frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    async fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

/// Writer side of a [`ChannelTransport`].
///
/// Yields frames in order until the transport is closed, then a single
/// [`Outbound::Close`] (frames still buffered at that point are dropped),
/// then `None`.
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
    done: bool,
}

impl OutboundReceiver {
    /// Next item for the socket.
    pub async fn recv(&mut self) -> Option<Outbound> {
        if self.done {
            return None;
        }
        let item = tokio::select! {
            biased;
            () = self.closed.cancelled() => Some(Outbound::Close),
            item = self.rx.recv() => item,
        };
        if !matches!(item, Some(Outbound::Frame(_))) {
            self.done = true;
        }
        item
    }

    /// Fires when the transport is closed. Lets a writer abandon a socket
    /// write that is stuck on a peer that stopped reading.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }
}
