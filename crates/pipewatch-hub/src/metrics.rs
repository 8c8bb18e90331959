//! Metric names recorded through the `metrics` facade.
//!
//! Nothing is exported unless the binary installs a recorder.

/// Connections registered since start (counter).
pub const CONNECTIONS_TOTAL: &str = "hub_connections_total";
/// Connections removed since start (counter).
pub const DISCONNECTIONS_TOTAL: &str = "hub_disconnections_total";
/// Currently registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "hub_connections_active";
/// Messages accepted by the queue, labelled by `type` (counter).
pub const MESSAGES_ENQUEUED_TOTAL: &str = "hub_messages_enqueued_total";
/// Messages that completed a dispatch pass, labelled by `type` (counter).
pub const MESSAGES_DISPATCHED_TOTAL: &str = "hub_messages_dispatched_total";
/// Per-connection send failures (counter).
pub const SEND_FAILURES_TOTAL: &str = "hub_send_failures_total";
/// Messages waiting in the queue (gauge).
pub const QUEUE_DEPTH: &str = "hub_queue_depth";
/// Snapshot provider failures and timeouts (counter).
pub const PROVIDER_FAILURES_TOTAL: &str = "hub_provider_failures_total";
/// Inbound client frames ignored as unsupported (counter).
pub const INBOUND_IGNORED_TOTAL: &str = "hub_inbound_ignored_total";
/// Ingestion calls discarded because the hub was stopped (counter).
pub const INGEST_DISCARDED_TOTAL: &str = "hub_ingest_discarded_total";

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[&str] = &[
        CONNECTIONS_TOTAL,
        DISCONNECTIONS_TOTAL,
        CONNECTIONS_ACTIVE,
        MESSAGES_ENQUEUED_TOTAL,
        MESSAGES_DISPATCHED_TOTAL,
        SEND_FAILURES_TOTAL,
        QUEUE_DEPTH,
        PROVIDER_FAILURES_TOTAL,
        INBOUND_IGNORED_TOTAL,
        INGEST_DISCARDED_TOTAL,
    ];

    #[test]
    fn metric_names_are_snake_case() {
        for name in ALL {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
            assert!(name.starts_with("hub_"), "{name} lacks the hub_ prefix");
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn counters_render_through_prometheus() {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(SEND_FAILURES_TOTAL).increment(3);
            metrics::gauge!(QUEUE_DEPTH).set(7.0);
        });
        let rendered = handle.render();
        assert!(rendered.contains("hub_send_failures_total 3"));
        assert!(rendered.contains("hub_queue_depth 7"), "{rendered}");
    }
}
