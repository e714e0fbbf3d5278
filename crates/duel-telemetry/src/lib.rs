//! Tracing subscriber setup for the duel server.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "duel_server::websocket" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// One JSON object per line instead of the human-readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from the string levels used in settings files. Unknown level
    /// names fall back to INFO for the default and are dropped for modules.
    pub fn from_names<'a>(
        level: &str,
        modules: impl IntoIterator<Item = (&'a String, &'a String)>,
        json: bool,
    ) -> Self {
        Self {
            log_level: Level::from_str(level).unwrap_or(Level::INFO),
            module_levels: modules
                .into_iter()
                .filter_map(|(module, lvl)| {
                    Level::from_str(lvl).ok().map(|l| (module.clone(), l))
                })
                .collect(),
            json,
        }
    }

    /// The filter directive string, e.g. `info,duel_server=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Install the global subscriber. Call once at startup; a second call fails.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn directives_include_module_levels() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("duel_server".into(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.directives(), "warn,duel_server=debug");
    }

    #[test]
    fn from_names_skips_unknown_levels() {
        let mut modules = BTreeMap::new();
        let _ = modules.insert("duel_core".to_string(), "trace".to_string());
        let _ = modules.insert("noisy".to_string(), "loud".to_string());
        let config = TelemetryConfig::from_names("bogus", &modules, true);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.module_levels, vec![("duel_core".to_string(), Level::TRACE)]);
        assert!(config.json);
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(init_telemetry(&config).is_err());
    }
}
