//! Settings types.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use textcast_core::{Framing, SessionConfig};

use crate::errors::{Result, SettingsError};

/// Largest accepted `bus.historyLimit`.
pub const MAX_HISTORY_LIMIT: usize = 100_000;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextcastSettings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Broadcast bus settings.
    pub bus: BusSettings,
    /// Stream session settings.
    pub stream: StreamSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl TextcastSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bus.history_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "bus.historyLimit must be greater than 0".into(),
            ));
        }
        if self.bus.history_limit > MAX_HISTORY_LIMIT {
            return Err(SettingsError::InvalidValue(format!(
                "bus.historyLimit must be at most {MAX_HISTORY_LIMIT}"
            )));
        }
        if self.stream.keep_alive_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "stream.keepAliveIntervalMs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// History limit as the non-zero type the bus expects.
    pub fn history_limit(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.bus.history_limit).ok_or_else(|| {
            SettingsError::InvalidValue("bus.historyLimit must be greater than 0".into())
        })
    }

    /// Per-session tunables.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            keep_alive_interval: Duration::from_millis(self.stream.keep_alive_interval_ms),
        }
    }
}

/// Network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5173,
        }
    }
}

/// Broadcast bus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Number of text events retained for replay.
    pub history_limit: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self { history_limit: 20 }
    }
}

/// Stream session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Keep-alive period in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Payload encoding for text events.
    pub framing: Framing,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: 15_000,
            framing: Framing::Json,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = TextcastSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.history_limit().unwrap().get(), 20);
    }

    #[test]
    fn default_stream_settings() {
        let cfg = TextcastSettings::default().session_config();
        assert_eq!(cfg.keep_alive_interval, Duration::from_secs(15));
        assert_eq!(TextcastSettings::default().stream.framing, Framing::Json);
    }

    #[test]
    fn zero_history_limit_rejected() {
        let mut settings = TextcastSettings::default();
        settings.bus.history_limit = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
        assert!(settings.history_limit().is_err());
    }

    #[test]
    fn zero_keep_alive_rejected() {
        let mut settings = TextcastSettings::default();
        settings.stream.keep_alive_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn oversized_history_limit_rejected() {
        let mut settings = TextcastSettings::default();
        settings.bus.history_limit = MAX_HISTORY_LIMIT;
        settings.validate().unwrap();

        settings.bus.history_limit = MAX_HISTORY_LIMIT + 1;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));

        settings.bus.history_limit = usize::MAX;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(TextcastSettings::default()).unwrap();
        assert_eq!(json["bus"]["historyLimit"], 20);
        assert_eq!(json["stream"]["keepAliveIntervalMs"], 15_000);
        assert_eq!(json["stream"]["framing"], "json");
        assert_eq!(json["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TextcastSettings =
            serde_json::from_str(r#"{"stream": {"framing": "legacy"}}"#).unwrap();
        assert_eq!(settings.stream.framing, Framing::Legacy);
        assert_eq!(settings.stream.keep_alive_interval_ms, 15_000);
        assert_eq!(settings.server.port, 5173);
    }
}
