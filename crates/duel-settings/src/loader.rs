//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DuelSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `DUEL_*` environment overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::DuelSettings;

/// `$DUEL_HOME/settings.json`, falling back to `~/.duel/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(home) = std::env::var_os("DUEL_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join("settings.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".duel").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DuelSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DuelSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<DuelSettings> {
    let defaults = serde_json::to_value(DuelSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and a
/// `null` in `source` keeps the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `DUEL_*` environment variables to loaded settings.
pub fn apply_env_overrides(settings: &mut DuelSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Values that fail to parse or fall
/// outside their range are logged and skipped.
pub fn apply_overrides_from(settings: &mut DuelSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("DUEL_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("DUEL_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("DUEL_FRONTEND_URL") {
        settings.server.frontend_url = v;
    }
    if let Some(v) = env.u64("DUEL_PING_INTERVAL_SECS", 1, 3600) {
        settings.hub.ping_interval_secs = v;
    }
    if let Some(v) = env.u64("DUEL_PING_TIMEOUT_SECS", 1, 86_400) {
        settings.hub.ping_timeout_secs = v;
    }
    if let Some(v) = env.usize("DUEL_COMMAND_QUEUE", 1, 1_000_000) {
        settings.hub.command_queue = v;
    }
    if let Some(v) = env.usize("DUEL_SEND_QUEUE", 1, 100_000) {
        settings.hub.send_queue = v;
    }
    if let Some(v) = env.string("DUEL_JWT_SECRET") {
        settings.auth.jwt_secret = Some(SecretString::from(v));
    }
    if let Some(v) = env.string("DUEL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("DUEL_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject combinations the server cannot run with.
pub fn validate(settings: &DuelSettings) -> Result<()> {
    let hub = &settings.hub;
    if hub.command_queue == 0 || hub.send_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "queue capacities must be positive".into(),
        ));
    }
    if hub.ping_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "pingIntervalSecs must be positive".into(),
        ));
    }
    if hub.ping_timeout_secs <= hub.ping_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "pingTimeoutSecs ({}) must exceed pingIntervalSecs ({})",
            hub.ping_timeout_secs, hub.ping_interval_secs
        )));
    }
    if settings.server.read_limit_bytes == 0 {
        return Err(SettingsError::InvalidValue(
            "readLimitBytes must be positive".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn checked<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.checked(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.checked(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.checked(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.checked(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
