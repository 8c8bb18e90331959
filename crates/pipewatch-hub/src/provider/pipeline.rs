use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use pipewatch_core::PipelineStatus;
use tokio::time::Instant;

/// Rolling query throughput over a trailing window.
pub struct PipelineTracker {
    window: Duration,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    active: u64,
    completed: VecDeque<(Instant, Duration)>,
}

impl TrackerState {
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some((at, _)) = self.completed.front() {
            if now.duration_since(*at) > window {
                let _ = self.completed.pop_front();
            } else {
                break;
            }
        }
    }
}

impl PipelineTracker {
    /// Tracker over the trailing `window`. A zero window is treated as one
    /// second.
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_secs(1)),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// A query entered the pipeline.
    pub fn query_started(&self) {
        self.state.lock().active += 1;
    }

    /// A query left the pipeline after `elapsed`.
    pub fn query_finished(&self, elapsed: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        state.completed.push_back((now, elapsed));
        state.evict(now, self.window);
    }

    /// Current figures, normalized to a per-minute rate.
    #[allow(clippy::cast_precision_loss)]
    pub fn status(&self) -> PipelineStatus {
        let mut state = self.state.lock();
        state.evict(Instant::now(), self.window);

        let count = state.completed.len();
        let avg_response_time = if count == 0 {
            0.0
        } else {
            let total_ms: f64 = state
                .completed
                .iter()
                .map(|(_, d)| d.as_secs_f64() * 1000.0)
                .sum();
            total_ms / count as f64
        };
        PipelineStatus {
            queries_per_minute: count as f64 * 60.0 / self.window.as_secs_f64(),
            avg_response_time,
            active_queries: state.active,
        }
    }
}
