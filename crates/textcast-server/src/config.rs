//! Server configuration.

use textcast_core::{Framing, SessionConfig};
use textcast_settings::TextcastSettings;

/// Configuration for the textcast server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Per-stream keep-alive settings.
    pub session: SessionConfig,
    /// Text payload encoding for all streams.
    pub framing: Framing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            session: SessionConfig::default(),
            framing: Framing::Json,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &TextcastSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            session: settings.session_config(),
            framing: settings.stream.framing,
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
