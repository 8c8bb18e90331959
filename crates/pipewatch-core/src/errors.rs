//! Error taxonomy.
//!
//! Every failure inside the hub is local to one boundary: a single
//! connection, a single sample, a single inbound frame, or a single ingest
//! call. None of them is allowed to take the hosting process down, so the
//! types here are recorded and logged rather than propagated to `main`.

use std::time::Duration;

use thiserror::Error;

/// Send or close failure on one connection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer or its writer task is gone.
    #[error("transport closed")]
    Closed,
    /// The outbound buffer of a slow client is full.
    #[error("outbound buffer full")]
    Backpressure,
    /// The send did not finish in time.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Metrics collection failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// A named sub-collector failed.
    #[error("collector '{collector}' failed: {message}")]
    Collector {
        /// Sub-collector name (e.g. `host`, `gpu`).
        collector: String,
        /// Failure detail.
        message: String,
    },
    /// Collection exceeded its deadline.
    #[error("snapshot timed out after {0:?}")]
    Timeout(Duration),
    /// A blocking worker panicked or was cancelled.
    #[error("collector worker failed: {0}")]
    Join(String),
}

impl ProviderError {
    /// Shorthand for [`ProviderError::Collector`].
    pub fn collector(collector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collector {
            collector: collector.into(),
            message: message.into(),
        }
    }
}

/// Unexpected inbound frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A text frame other than the liveness ping.
    #[error("unexpected text frame ({len} bytes)")]
    UnexpectedText {
        /// Frame length in bytes.
        len: usize,
    },
    /// A binary or otherwise unsupported frame.
    #[error("unsupported {kind} frame")]
    UnsupportedFrame {
        /// Frame kind label.
        kind: &'static str,
    },
}

/// Rejected input on the event-ingestion API.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    /// Stage id outside the declared stage set.
    #[error("unknown stage '{0}'")]
    UnknownStage(String),
    /// A full stage graph that fails validation.
    #[error("invalid stage graph: {0}")]
    InvalidGraph(String),
}
