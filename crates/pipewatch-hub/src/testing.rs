//! Test doubles for the [`Transport`] and [`SnapshotProvider`] seams.
//!
//! Public so the server crate's integration tests can drive a hub without
//! real sockets or a real host.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipewatch_core::{MetricsSnapshot, ProviderError, TransportError};

use crate::provider::SnapshotProvider;
use crate::transport::Transport;

/// Records every frame it is asked to send.
#[derive(Default)]
pub struct MockTransport {
    frames: Mutex<Vec<String>>,
    failure: Mutex<Option<TransportError>>,
    delay: Option<Duration>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockTransport {
    /// A transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every send.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every following send fail with `error`.
    pub fn fail_with(&self, error: TransportError) {
        *self.failure.lock() = Some(error);
    }

    /// Frames received so far.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// The `type` field of every JSON frame, or the raw text otherwise.
    pub fn frame_types(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .map(|f| {
                serde_json::from_str::<serde_json::Value>(f)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned))
                    .unwrap_or_else(|| f.clone())
            })
            .collect()
    }

    /// Frames parsed as JSON; non-JSON frames are skipped.
    pub fn json_frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// How many times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames of type `kind` arrived. Returns
    /// `false` on timeout.
    pub async fn wait_for_type(&self, kind: &str, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.frame_types().iter().filter(|t| *t == kind).count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait until at least `count` frames arrived. Returns `false` on timeout.
    pub async fn wait_for_frames(&self, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.frames.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: Arc<str>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        self.frames.lock().push(frame.to_string());
        Ok(())
    }

    async fn close(&self) {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Provider that replays queued results, then repeats a fallback.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<MetricsSnapshot, ProviderError>>>,
    fallback: Mutex<Result<MetricsSnapshot, ProviderError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Always returns `snapshot` unless results are queued.
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(snapshot)),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails.
    pub fn failing() -> Self {
        let provider = Self::new(MetricsSnapshot::zeroed());
        *provider.fallback.lock() = Err(ProviderError::collector("scripted", "always fails"));
        provider
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one result ahead of the fallback.
    pub fn push(&self, result: Result<MetricsSnapshot, ProviderError>) {
        self.script.lock().push_back(result);
    }

    /// Number of `snapshot` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn snapshot(&self) -> Result<MetricsSnapshot, ProviderError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().clone())
    }
}

/// Provider whose every call panics, taking down the calling task.
pub struct PanickingProvider;

#[async_trait]
impl SnapshotProvider for PanickingProvider {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn snapshot(&self) -> Result<MetricsSnapshot, ProviderError> {
        panic!("snapshot provider panicked");
    }
}

/// Snapshot with the given host CPU and memory figures, everything else zero.
pub fn host_snapshot(cpu: f64, memory: f64) -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::zeroed();
    snapshot.system_health.cpu = cpu;
    snapshot.system_health.memory = memory;
    snapshot
}
