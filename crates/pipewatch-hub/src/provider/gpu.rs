use std::io::ErrorKind;
use std::time::Duration;

use pipewatch_core::{GpuReading, ProviderError};
use tokio::process::Command;
use tracing::debug;

const QUERY: &str = "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu";

/// GPU readings from `nvidia-smi`.
///
/// A missing binary means "no GPU" and yields an empty list. Any other
/// failure is a collector error.
#[derive(Clone, Debug)]
pub struct GpuCollector {
    program: String,
    timeout: Duration,
}

impl GpuCollector {
    /// Run `program` with a per-call `timeout`.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Query every GPU.
    pub async fn sample(&self) -> Result<Vec<GpuReading>, ProviderError> {
        let mut command = Command::new(&self.program);
        let _ = command
            .arg(QUERY)
            .arg("--format=csv,noheader,nounits")
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(ProviderError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(program = %self.program, "gpu query tool not installed");
                return Ok(Vec::new());
            }
            Ok(Err(e)) => return Err(ProviderError::collector("gpu", e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::collector(
                "gpu",
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for GpuCollector {
    fn default() -> Self {
        Self::new("nvidia-smi", Duration::from_secs(2))
    }
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` output, one GPU per line.
///
/// Fields reported as `[N/A]` or `[Not Supported]` read as zero.
pub fn parse_nvidia_smi(stdout: &str) -> Result<Vec<GpuReading>, ProviderError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [utilization, memory_used, memory_total, temperature] = fields[..] else {
                return Err(ProviderError::collector(
                    "gpu",
                    format!("expected 4 fields, got {}: {line}", fields.len()),
                ));
            };
            Ok(GpuReading {
                utilization: field(utilization)?,
                memory_used: field(memory_used)?,
                memory_total: field(memory_total)?,
                temperature: field(temperature)?,
            })
        })
        .collect()
}

fn field(raw: &str) -> Result<f64, ProviderError> {
    if raw.starts_with('[') {
        return Ok(0.0);
    }
    raw.parse()
        .map_err(|_| ProviderError::collector("gpu", format!("not a number: {raw}")))
}
