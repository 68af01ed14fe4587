//! # textcast-settings
//!
//! Configuration for the textcast server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TextcastSettings::default()`]
//! 2. **User file**: `~/.textcast/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TEXTCAST_*` overrides (highest priority)
//!
//! The merged result is validated before it is returned. A history limit
//! outside `1..=100_000` or a zero keep-alive interval is rejected.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
