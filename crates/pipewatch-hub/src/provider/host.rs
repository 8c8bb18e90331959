use std::sync::Arc;

use parking_lot::Mutex;
use pipewatch_core::{ProviderError, SystemHealth};
use sysinfo::System;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU and memory sampling through `sysinfo`.
///
/// `System` keeps the previous CPU reading so usage is computed across
/// consecutive samples. Refreshing it blocks, so it runs on the blocking
/// pool.
#[derive(Clone)]
pub struct HostCollector {
    system: Arc<Mutex<System>>,
}

impl HostCollector {
    /// Collector with an empty `System`.
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    /// Refresh and read host health.
    pub async fn sample(&self) -> Result<SystemHealth, ProviderError> {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || {
            let mut sys = system.lock();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            health_from(
                f64::from(sys.global_cpu_usage()),
                sys.total_memory(),
                sys.available_memory(),
            )
        })
        .await
        .map_err(|e| ProviderError::Join(e.to_string()))?
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn health_from(cpu: f64, total: u64, available: u64) -> Result<SystemHealth, ProviderError> {
    if total == 0 {
        return Err(ProviderError::collector("host", "total memory reported as zero"));
    }
    let used = total.saturating_sub(available);
    Ok(SystemHealth {
        cpu: round1(cpu.clamp(0.0, 100.0)),
        memory: round1(used as f64 / total as f64 * 100.0),
        memory_available: round2(available as f64 / BYTES_PER_GIB),
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
