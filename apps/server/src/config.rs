//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use deolink_core::protocol_constants::{
    CONNECT_TIMEOUT_MS, CONTROL_LISTEN_PORT, DEFAULT_ADDRESS_PREFIX, DEVICE_PORT,
    HEARTBEAT_INTERVAL_MS, MAX_CONNECT_ATTEMPTS,
};
use deolink_core::ConfigError;
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host running DeoVR.
    /// Override: `DEOLINK_DEVICE_HOST`
    pub device_host: Option<String>,

    /// DeoVR remote-control port.
    /// Override: `DEOLINK_DEVICE_PORT`
    pub device_port: u16,

    /// Local port for inbound OSC.
    /// Override: `DEOLINK_LISTEN_PORT`
    pub listen_port: u16,

    /// Where `/playerstate` messages go, as "host[:port]".
    /// Override: `DEOLINK_REMOTE`
    pub remote: Option<String>,

    /// Namespace in front of inbound OSC addresses.
    pub address_prefix: String,

    /// Keep-alive period in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Consecutive connection failures tolerated before giving up.
    pub max_connect_attempts: u32,

    /// Timeout for one connect attempt in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            device_host: None,
            device_port: DEVICE_PORT,
            listen_port: CONTROL_LISTEN_PORT,
            remote: None,
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            max_connect_attempts: MAX_CONNECT_ATTEMPTS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// Values that fail to parse are ignored.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("DEOLINK_DEVICE_HOST").filter(|h| !h.trim().is_empty()) {
            self.device_host = Some(host);
        }

        if let Some(port) = var("DEOLINK_DEVICE_PORT").and_then(|v| v.parse().ok()) {
            self.device_port = port;
        }

        if let Some(port) = var("DEOLINK_LISTEN_PORT").and_then(|v| v.parse().ok()) {
            self.listen_port = port;
        }

        if let Some(remote) = var("DEOLINK_REMOTE").filter(|r| !r.trim().is_empty()) {
            self.remote = Some(remote);
        }

        // Note: DEOLINK_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to deolink-core's Config type.
    pub fn to_core_config(&self) -> Result<deolink_core::Config, ConfigError> {
        let mut config = deolink_core::Config {
            device_host: self.device_host.clone().unwrap_or_default(),
            device_port: self.device_port,
            control_listen_port: self.listen_port,
            address_prefix: self.address_prefix.clone(),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            max_connect_attempts: self.max_connect_attempts,
            connect_timeout_ms: self.connect_timeout_ms,
            ..Default::default()
        };
        if let Some(remote) = &self.remote {
            config.set_remote_target(remote)?;
        }
        config.validate()?;
        Ok(config)
    }
}
