//! `textcast` serves one shared text to any number of live listeners.

use std::path::PathBuf;

use clap::Parser;
use textcast_core::BroadcastBus;
use textcast_server::{ServerConfig, TextcastServer};
use textcast_settings::{TextcastSettings, load_settings, load_settings_from_path};

/// Command-line overrides, applied on top of the settings file and env.
#[derive(Debug, Parser)]
#[command(name = "textcast", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.textcast/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bind address.
    #[arg(long)]
    host: Option<String>,
    /// Bind port.
    #[arg(long)]
    port: Option<u16>,
    /// Number of text events retained for replay.
    #[arg(long)]
    history_limit: Option<usize>,
}

impl Cli {
    fn apply(&self, settings: &mut TextcastSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(limit) = self.history_limit {
            settings.bus.history_limit = limit;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path)?,
        None => load_settings()?,
    };
    cli.apply(&mut settings);
    settings.validate()?;

    textcast_server::logging::init_logging(&settings.logging)?;
    tracing::info!("Starting textcast");

    let bus = BroadcastBus::new(settings.history_limit()?);
    let server = TextcastServer::new(ServerConfig::from_settings(&settings), bus);
    let handle = server.start().await?;

    tracing::info!(port = handle.port(), "textcast ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "textcast",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--history-limit",
            "3",
        ]);
        let mut settings = TextcastSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.bus.history_limit, 3);
    }

    #[test]
    fn cli_zero_history_limit_fails_validation() {
        let cli = Cli::parse_from(["textcast", "--history-limit", "0"]);
        let mut settings = TextcastSettings::default();
        cli.apply(&mut settings);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn cli_oversized_history_limit_fails_validation() {
        let cli = Cli::parse_from(["textcast", "--history-limit", "18446744073709551615"]);
        let mut settings = TextcastSettings::default();
        cli.apply(&mut settings);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn cli_without_flags_keeps_settings() {
        let cli = Cli::parse_from(["textcast"]);
        let mut settings = TextcastSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 5173);
        assert!(cli.config.is_none());
    }
}
