//! Event-ingestion API for producers outside the hub.
//!
//! Every call is fire-and-forget: it validates, enqueues and returns.
//! `Ok(())` means "accepted", never "delivered", and no call reports how many
//! clients were connected. While the hub is stopped nothing could deliver a
//! message, so broadcasts are discarded and counted instead of piling up.

use std::sync::atomic::Ordering;
use std::time::Duration;

use metrics::counter;
use pipewatch_core::{
    Envelope, HubMessage, IngestError, PipelineEvent, ServiceStatus, StageGraph, TestMessage,
    stages::is_declared_stage,
};
use tracing::debug;

use crate::hub::TelemetryHub;
use crate::metrics::INGEST_DISCARDED_TOTAL;
use crate::provider::Service;

impl TelemetryHub {
    /// Broadcast a stage transition.
    pub async fn record_pipeline_event(
        &self,
        stage: &str,
        payload: serde_json::Value,
    ) -> Result<(), IngestError> {
        if !is_declared_stage(stage) {
            return Err(IngestError::UnknownStage(stage.to_string()));
        }
        let message = HubMessage::PipelineEvent(PipelineEvent {
            stage: stage.to_string(),
            payload,
        });
        let _ = self.broadcast(message).await;
        Ok(())
    }

    /// Broadcast a full stage graph for resync.
    pub async fn record_pipeline_state(&self, graph: StageGraph) -> Result<(), IngestError> {
        graph.validate()?;
        let _ = self.broadcast(HubMessage::PipelineState(graph)).await;
        Ok(())
    }

    /// Broadcast a synthetic `test_message`. Returns whether it was queued.
    pub async fn broadcast_test(&self, note: impl Into<String>) -> bool {
        if !self.is_running().await {
            self.discard("test_message");
            return false;
        }
        let sequence = self.test_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.broadcast(HubMessage::TestMessage(TestMessage {
            note: note.into(),
            sequence,
        }))
        .await
    }

    /// A query entered the pipeline.
    pub fn query_started(&self) {
        self.pipeline.query_started();
    }

    /// A query finished after `elapsed`.
    pub fn query_finished(&self, elapsed: Duration) {
        self.pipeline.query_finished(elapsed);
    }

    /// Report a collaborator's reachability.
    pub fn set_service_status(&self, service: Service, status: ServiceStatus) {
        self.services.set(service, status);
    }

    async fn broadcast(&self, message: HubMessage) -> bool {
        if !self.is_running().await {
            self.discard(message.message_type().as_str());
            return false;
        }
        self.queue.enqueue(Envelope::new(message));
        true
    }

    fn discard(&self, kind: &'static str) {
        counter!(INGEST_DISCARDED_TOTAL, "type" => kind).increment(1);
        debug!(message_type = kind, "hub stopped, discarding broadcast");
    }
}
