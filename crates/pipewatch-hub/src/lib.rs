//! # pipewatch-hub
//!
//! The real-time core: a [`ConnectionRegistry`] of dashboard clients, a FIFO
//! [`BroadcastQueue`], a single [`Dispatcher`] that fans each message out to
//! every registered connection, a periodic [`Sampler`] feeding the queue from
//! a [`SnapshotProvider`], and the [`TelemetryHub`] lifecycle controller that
//! owns them.
//!
//! Producers outside the hub only see the ingestion methods on
//! [`TelemetryHub`]; transports only see the [`Transport`] trait.

#![deny(unsafe_code)]

pub mod connection;
pub mod dispatcher;
pub mod handshake;
pub mod hub;
pub mod ingest;
pub mod metrics;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod sampler;
pub mod testing;
pub mod transport;

pub use connection::{Connection, ConnectionInfo};
pub use dispatcher::Dispatcher;
pub use handshake::Handshake;
pub use hub::{HubConfig, TelemetryHub, Transition};
pub use provider::{
    GpuCollector, HostCollector, PipelineTracker, Service, ServiceBoard, SnapshotCache,
    SnapshotProvider, SystemSnapshotProvider,
};
pub use queue::BroadcastQueue;
pub use registry::{ConnectionRegistry, RegistryStats};
pub use sampler::Sampler;
pub use transport::{ChannelTransport, Outbound, OutboundReceiver, Transport};
