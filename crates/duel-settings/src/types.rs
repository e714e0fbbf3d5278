//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a settings file only needs the keys it changes.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Root settings for the duel server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuelSettings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Origin allowed by the CORS layer on every HTTP route.
    pub frontend_url: String,
    /// Largest inbound frame accepted, in bytes.
    pub read_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            read_limit_bytes: 1024 * 1024,
        }
    }
}

/// Queue sizes and liveness timings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of the command bus shared by all sessions.
    pub command_queue: usize,
    /// Capacity of each session's outbound queue.
    pub send_queue: usize,
    pub ping_interval_secs: u64,
    /// A session that sends nothing for this long is torn down.
    pub ping_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            command_queue: 1024,
            send_queue: 256,
            ping_interval_secs: 5,
            ping_timeout_secs: 30,
            write_timeout_secs: 10,
        }
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 secret. Never written back out.
    #[serde(skip_serializing, deserialize_with = "secret_from_string")]
    pub jwt_secret: Option<SecretString>,
    /// Accept `?token=` on the upgrade request (browsers cannot set headers).
    pub allow_query_token: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            allow_query_token: true,
        }
    }
}

fn secret_from_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-target overrides, e.g. `{"duel_server::websocket": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults() {
        let s = DuelSettings::default();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.frontend_url, "http://localhost:5173");
        assert_eq!(s.server.read_limit_bytes, 1_048_576);
        assert_eq!(s.hub.ping_interval_secs, 5);
        assert_eq!(s.hub.ping_timeout_secs, 30);
        assert_eq!(s.hub.write_timeout_secs, 10);
        assert!(s.auth.jwt_secret.is_none());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(DuelSettings::default()).unwrap();
        assert_eq!(json["server"]["frontendUrl"], "http://localhost:5173");
        assert_eq!(json["hub"]["pingIntervalSecs"], 5);
        assert!(json["auth"].get("jwtSecret").is_none());
    }

    #[test]
    fn secret_is_read_but_redacted() {
        let s: DuelSettings =
            serde_json::from_str(r#"{"auth": {"jwtSecret": "hunter2"}}"#).unwrap();
        let secret = s.auth.jwt_secret.as_ref().unwrap();
        assert_eq!(secret.expose_secret(), "hunter2");
        assert!(!format!("{s:?}").contains("hunter2"));
    }

    #[test]
    fn empty_secret_is_none() {
        let s: DuelSettings = serde_json::from_str(r#"{"auth": {"jwtSecret": ""}}"#).unwrap();
        assert!(s.auth.jwt_secret.is_none());
    }
}
