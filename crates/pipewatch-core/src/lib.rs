//! # pipewatch-core
//!
//! Foundation types shared by every pipewatch crate:
//!
//! - **Branded IDs**: [`ConnectionId`] as a newtype for type safety
//! - **Messages**: [`HubMessage`] sum type over the fixed broadcast kinds,
//!   wrapped in an [`Envelope`] that carries the wire timestamp
//! - **Snapshots**: [`MetricsSnapshot`] and its sub-blocks
//! - **Stage graph**: the fixed dashboard [`StageGraph`]
//! - **Errors**: transport/provider/protocol/ingest taxonomy via `thiserror`
//! - **Logging**: subscriber init and a capture layer for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;
pub mod snapshot;
pub mod stages;

pub use errors::{IngestError, ProtocolError, ProviderError, TransportError};
pub use ids::ConnectionId;
pub use message::{
    ConnectionEstablished, Envelope, HubMessage, InitialState, MessageType, PipelineEvent,
    SnapshotSource, TestMessage,
};
pub use snapshot::{
    ConnectionStatus, GpuReading, MetricsSnapshot, PipelineStatus, ServiceStatus, SystemHealth,
};
pub use stages::{Stage, StageEdge, StageGraph, StageMetrics, StageStatus};
