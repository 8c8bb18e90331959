use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipewatch_core::MetricsSnapshot;

/// Latest successful snapshot and when it was taken.
///
/// Written by the sampler, read by the handshake and the status endpoint.
#[derive(Default)]
pub struct SnapshotCache {
    latest: RwLock<Option<(MetricsSnapshot, DateTime<Utc>)>>,
}

impl SnapshotCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot.
    pub fn store(&self, snapshot: MetricsSnapshot) {
        *self.latest.write() = Some((snapshot, Utc::now()));
    }

    /// Latest snapshot, if any sample ever succeeded.
    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.latest.read().as_ref().map(|(s, _)| s.clone())
    }

    /// When the latest snapshot was stored.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.latest.read().as_ref().map(|(_, at)| *at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_stored() {
        let cache = SnapshotCache::new();
        assert!(cache.latest().is_none());
        assert!(cache.updated_at().is_none());

        let snap = MetricsSnapshot::zeroed().with_active_connections(2);
        cache.store(snap.clone());
        assert_eq!(cache.latest(), Some(snap));
        assert!(cache.updated_at().is_some());
    }

    #[test]
    fn store_replaces_previous() {
        let cache = SnapshotCache::new();
        cache.store(MetricsSnapshot::zeroed());
        let first = cache.updated_at();
        cache.store(MetricsSnapshot::zeroed().with_active_connections(5));
        assert_eq!(cache.latest().map(|s| s.connection_status.active_connections), Some(5));
        assert!(cache.updated_at() >= first);
    }
}
