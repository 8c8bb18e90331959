//! # pipewatch-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PipewatchSettings::default()`]
//! 2. **User file**: `~/.pipewatch/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PIPEWATCH_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    clamp_to_ranges, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
