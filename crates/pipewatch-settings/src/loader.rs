//! Settings loading.
//!
//! Compiled defaults are serialized to JSON, the user file (if any) is
//! deep-merged over them, and `PIPEWATCH_*` environment variables are
//! applied last. A missing file is not an error; malformed JSON is.
//! Out-of-range file values are clamped into the same ranges the
//! environment overrides accept.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{PipewatchSettings, ServerSettings};

const SAMPLE_INTERVAL_MS: (u64, u64) = (50, 3_600_000);
const DISPATCH_POLL_MS: (u64, u64) = (10, 60_000);
const SEND_TIMEOUT_MS: (u64, u64) = (10, 600_000);
const SNAPSHOT_TIMEOUT_MS: (u64, u64) = (10, 600_000);
const QUEUE_WARN_DEPTH: (usize, usize) = (1, 10_000_000);
const SHUTDOWN_TIMEOUT_MS: (u64, u64) = (100, 600_000);
const QUERY_WINDOW_SECS: (u64, u64) = (1, 86_400);
const OUTBOUND_BUFFER: (usize, usize) = (1, 1 << 20);
const MAX_MESSAGE_SIZE: (usize, usize) = (1 << 10, 16 << 20);

/// Default settings file location (`~/.pipewatch/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pipewatch").join("settings.json")
}

/// Load from [`settings_path`] with environment overrides.
pub fn load_settings() -> Result<PipewatchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with environment overrides.
pub fn load_settings_from_path(path: &Path) -> Result<PipewatchSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Load from `path` without consulting the environment.
pub fn read_settings_file(path: &Path) -> Result<PipewatchSettings> {
    let defaults = serde_json::to_value(PipewatchSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let raw = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&raw)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };
    let mut settings: PipewatchSettings = serde_json::from_value(merged)?;
    clamp_to_ranges(&mut settings);
    Ok(settings)
}

/// Pull every bounded value back inside its accepted range.
///
/// An invalid `ws_path` falls back to the default path.
pub fn clamp_to_ranges(settings: &mut PipewatchSettings) {
    let hub = &mut settings.hub;
    clamp("hub.sample_interval_ms", &mut hub.sample_interval_ms, SAMPLE_INTERVAL_MS);
    clamp("hub.dispatch_poll_ms", &mut hub.dispatch_poll_ms, DISPATCH_POLL_MS);
    clamp("hub.send_timeout_ms", &mut hub.send_timeout_ms, SEND_TIMEOUT_MS);
    clamp("hub.snapshot_timeout_ms", &mut hub.snapshot_timeout_ms, SNAPSHOT_TIMEOUT_MS);
    clamp("hub.queue_warn_depth", &mut hub.queue_warn_depth, QUEUE_WARN_DEPTH);
    clamp("hub.shutdown_timeout_ms", &mut hub.shutdown_timeout_ms, SHUTDOWN_TIMEOUT_MS);
    clamp("hub.query_window_secs", &mut hub.query_window_secs, QUERY_WINDOW_SECS);

    let server = &mut settings.server;
    clamp("server.outbound_buffer", &mut server.outbound_buffer, OUTBOUND_BUFFER);
    clamp("server.max_message_size", &mut server.max_message_size, MAX_MESSAGE_SIZE);
    if parse_ws_path(&server.ws_path).is_none() {
        let fallback = ServerSettings::default().ws_path;
        warn!(key = "server.ws_path", value = %server.ws_path, to = %fallback, "invalid settings value, using default");
        server.ws_path = fallback;
    }
}

fn clamp<T>(key: &str, value: &mut T, (min, max): (T, T))
where
    T: PartialOrd + Copy + Display,
{
    let clamped = if *value < min {
        min
    } else if *value > max {
        max
    } else {
        return;
    };
    warn!(key, from = %value, to = %clamped, "settings value out of range, clamped");
    *value = clamped;
}

/// Merge `overlay` into `base`.
///
/// Objects merge per key, everything else is replaced, and `null` in the
/// overlay leaves the base value alone.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `PIPEWATCH_*` variables from the process environment.
pub fn apply_env_overrides(settings: &mut PipewatchSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using an arbitrary variable lookup.
///
/// Values that fail to parse or fall outside their range are logged and
/// ignored.
pub fn apply_overrides_with<F>(settings: &mut PipewatchSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("PIPEWATCH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("PIPEWATCH_PORT", |s| parse_in_range(s, 1u16, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("PIPEWATCH_WS_PATH", parse_ws_path) {
        settings.server.ws_path = v;
    }
    if let Some(v) = env.parsed("PIPEWATCH_SAMPLE_INTERVAL_MS", |s| {
        parse_in_range(s, SAMPLE_INTERVAL_MS.0, SAMPLE_INTERVAL_MS.1)
    }) {
        settings.hub.sample_interval_ms = v;
    }
    if let Some(v) = env.parsed("PIPEWATCH_SEND_TIMEOUT_MS", |s| {
        parse_in_range(s, SEND_TIMEOUT_MS.0, SEND_TIMEOUT_MS.1)
    }) {
        settings.hub.send_timeout_ms = v;
    }
    if let Some(v) = env.parsed("PIPEWATCH_QUEUE_WARN_DEPTH", |s| {
        parse_in_range(s, QUEUE_WARN_DEPTH.0, QUEUE_WARN_DEPTH.1)
    }) {
        settings.hub.queue_warn_depth = v;
    }
    if let Some(v) = env.string("PIPEWATCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("PIPEWATCH_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.string(name)?;
        let parsed = parse(raw.trim());
        if parsed.is_none() {
            warn!(key = name, value = %raw, "ignoring invalid env override");
        }
        parsed
    }
}

// ── Pure parsers ────────────────────────────────────────────────────────────

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitive.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and accept it only inside `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// WebSocket paths must be absolute.
pub fn parse_ws_path(val: &str) -> Option<String> {
    (val.starts_with('/') && !val.contains(char::is_whitespace)).then(|| val.to_string())
}
