//! Deolink Server - headless DeoVR to OSC bridge.
//!
//! Connects to a DeoVR player's remote-control port, forwards OSC commands to
//! it and reports its playback status back over OSC until interrupted.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use deolink_core::{bootstrap_bridge, ConfigError};
use tokio::signal;

use crate::config::ServerConfig;

/// Deolink - bridges DeoVR remote control and OSC.
#[derive(Parser, Debug)]
#[command(name = "deolink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host running DeoVR (overrides config file).
    #[arg(value_name = "DEVICE_HOST")]
    device_host: Option<String>,

    /// Where to send `/playerstate` messages, as "host[:port]".
    #[arg(value_name = "REMOTE")]
    remote: Option<String>,

    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "DEOLINK_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// DeoVR remote-control port (overrides config file).
    #[arg(long)]
    device_port: Option<u16>,

    /// Local port for inbound OSC (overrides config file).
    #[arg(short = 'p', long)]
    listen_port: Option<u16>,

    /// Namespace in front of inbound OSC addresses, e.g. "/deovr".
    #[arg(long)]
    prefix: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Deolink v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(host) = args.device_host {
        config.device_host = Some(host);
    }
    if let Some(remote) = args.remote {
        config.remote = Some(remote);
    }
    if let Some(port) = args.device_port {
        config.device_port = port;
    }
    if let Some(port) = args.listen_port {
        config.listen_port = port;
    }
    if let Some(prefix) = args.prefix {
        config.address_prefix = prefix;
    }

    let core_config = match config.to_core_config() {
        Ok(core_config) => core_config,
        Err(ConfigError::MissingDeviceHost) => Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "a device host is required (DEVICE_HOST, DEOLINK_DEVICE_HOST or device_host in the config file)",
            )
            .exit(),
        Err(e) => return Err(e).context("Invalid configuration"),
    };

    log::info!(
        "Configuration: device={}, listen_port={}, remote={}:{}, prefix={:?}",
        core_config.device_addr(),
        core_config.control_listen_port,
        core_config.control_remote_host,
        core_config.control_remote_port,
        core_config.address_prefix
    );

    let bridge = bootstrap_bridge(&core_config)
        .await
        .context("Failed to bootstrap bridge")?;
    bridge.start();

    log::info!("Bridge started, OSC listening on {}", bridge.listen_addr());

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    bridge.shutdown().await;

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_positional_host_and_remote() {
        let args = Args::try_parse_from(["deolink", "192.168.1.20", "10.0.0.5:9000"]).unwrap();
        assert_eq!(args.device_host.as_deref(), Some("192.168.1.20"));
        assert_eq!(args.remote.as_deref(), Some("10.0.0.5:9000"));
        assert!(args.prefix.is_none());
    }

    #[test]
    fn parses_port_overrides() {
        let args = Args::try_parse_from([
            "deolink",
            "vr-pc",
            "--device-port",
            "24000",
            "-p",
            "9100",
            "--prefix",
            "/stage",
        ])
        .unwrap();
        assert_eq!(args.device_port, Some(24000));
        assert_eq!(args.listen_port, Some(9100));
        assert_eq!(args.prefix.as_deref(), Some("/stage"));
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(Args::try_parse_from(["deolink", "vr-pc", "--device-port", "99999"]).is_err());
    }
}
