//! Broadcast messages and their wire envelope.
//!
//! Every frame on the wire is one JSON object `{type, data, timestamp}`.
//! [`HubMessage`] is adjacently tagged so `type`/`data` come from the enum
//! and [`Envelope`] contributes the `timestamp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ConnectionId;
use crate::snapshot::MetricsSnapshot;
use crate::stages::StageGraph;

/// Where the `system_metrics` block of an initial state came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Fetched from the provider during the handshake.
    Live,
    /// Latest sample taken by the periodic sampler.
    Cached,
    /// Zeroed placeholder; no data was available.
    Default,
}

/// Self-contained baseline sent once to each new connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    /// Fixed stage graph, all idle.
    pub pipeline: StageGraph,
    /// Best available metrics.
    pub system_metrics: MetricsSnapshot,
    /// Provenance of `system_metrics`.
    pub source: SnapshotSource,
}

/// Stage transition reported by a pipeline producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Declared stage id.
    pub stage: String,
    /// Producer-defined detail.
    pub payload: serde_json::Value,
}

/// Synthetic broadcast used to verify fan-out end to end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMessage {
    /// Free-form note.
    pub note: String,
    /// Monotonic counter of test broadcasts.
    pub sequence: u64,
}

/// Acknowledgement sent after registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    /// Id assigned to this connection.
    pub connection_id: ConnectionId,
    /// Sampler cadence the client can expect.
    pub sample_interval_ms: u64,
}

/// The fixed set of message kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubMessage {
    /// Handshake baseline.
    InitialState(InitialState),
    /// Periodic metrics sample.
    MetricsUpdate(MetricsSnapshot),
    /// Discrete stage transition.
    PipelineEvent(PipelineEvent),
    /// Full stage graph resync.
    PipelineState(StageGraph),
    /// Synthetic fan-out check.
    TestMessage(TestMessage),
    /// Registration acknowledgement.
    ConnectionEstablished(ConnectionEstablished),
}

/// Discriminant of [`HubMessage`], used for metric labels and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `initial_state`
    InitialState,
    /// `metrics_update`
    MetricsUpdate,
    /// `pipeline_event`
    PipelineEvent,
    /// `pipeline_state`
    PipelineState,
    /// `test_message`
    TestMessage,
    /// `connection_established`
    ConnectionEstablished,
}

impl MessageType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialState => "initial_state",
            Self::MetricsUpdate => "metrics_update",
            Self::PipelineEvent => "pipeline_event",
            Self::PipelineState => "pipeline_state",
            Self::TestMessage => "test_message",
            Self::ConnectionEstablished => "connection_established",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HubMessage {
    /// Discriminant.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::InitialState(_) => MessageType::InitialState,
            Self::MetricsUpdate(_) => MessageType::MetricsUpdate,
            Self::PipelineEvent(_) => MessageType::PipelineEvent,
            Self::PipelineState(_) => MessageType::PipelineState,
            Self::TestMessage(_) => MessageType::TestMessage,
            Self::ConnectionEstablished(_) => MessageType::ConnectionEstablished,
        }
    }
}

/// A message stamped with its creation time. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message.
    #[serde(flatten)]
    pub message: HubMessage,
    /// Creation time, serialized as RFC 3339.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Stamp `message` with the current time.
    pub fn new(message: HubMessage) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
        }
    }

    /// Discriminant of the wrapped message.
    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// Serialize to one wire frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<HubMessage> for Envelope {
    fn from(message: HubMessage) -> Self {
        Self::new(message)
    }
}
