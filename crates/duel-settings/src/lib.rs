//! # duel-settings
//!
//! Layered configuration for the duel server:
//! 1. **Compiled defaults** ([`DuelSettings::default()`])
//! 2. **Settings file** (`$DUEL_HOME/settings.json` or `~/.duel/settings.json`, deep-merged)
//! 3. **Environment variables** (`DUEL_*`, highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
