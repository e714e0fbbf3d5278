//! Server configuration.

use std::time::Duration;

use duel_settings::DuelSettings;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the duel server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Origin allowed by CORS.
    pub frontend_url: String,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Command bus capacity.
    pub command_queue: usize,
    /// Per-connection outbound queue capacity.
    pub send_queue: usize,
    pub ping_interval_secs: u64,
    /// Silence longer than this tears the connection down.
    pub ping_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// HS256 secret for upgrade tokens. `None` rejects every upgrade.
    #[serde(skip)]
    pub jwt_secret: Option<SecretString>,
    pub allow_query_token: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:5173".into(),
            max_message_size: 1024 * 1024,
            command_queue: 1024,
            send_queue: 256,
            ping_interval_secs: 5,
            ping_timeout_secs: 30,
            write_timeout_secs: 10,
            jwt_secret: None,
            allow_query_token: true,
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &DuelSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            frontend_url: settings.server.frontend_url.clone(),
            max_message_size: settings.server.read_limit_bytes,
            command_queue: settings.hub.command_queue,
            send_queue: settings.hub.send_queue,
            ping_interval_secs: settings.hub.ping_interval_secs,
            ping_timeout_secs: settings.hub.ping_timeout_secs,
            write_timeout_secs: settings.hub.write_timeout_secs,
            jwt_secret: settings.auth.jwt_secret.clone(),
            allow_query_token: settings.auth.allow_query_token,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
