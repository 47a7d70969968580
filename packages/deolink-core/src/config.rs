//! Bridge configuration.
//!
//! [`Config`] carries the peer addresses and tunables for one bridge
//! instance. All fields except the device host have sensible defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::{
    CONNECT_TIMEOUT_MS, CONTROL_LISTEN_PORT, CONTROL_REMOTE_PORT, DEFAULT_ADDRESS_PREFIX,
    DEVICE_IDLE_TIMEOUT_SECS, DEVICE_PORT, HEARTBEAT_INTERVAL_MS, MAX_CONNECT_ATTEMPTS,
};

/// Errors in startup parameters. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No device host was given.
    #[error("device host is required")]
    MissingDeviceHost,

    /// The combined "host[:port]" remote parameter could not be parsed.
    #[error("invalid remote target: {0}")]
    InvalidRemote(String),

    /// A port or numeric setting is out of range.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Configuration for one bridge instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Device (TCP)
    /// Host running DeoVR. Required.
    pub device_host: String,
    /// DeoVR remote-control port.
    pub device_port: u16,

    // Control (OSC over UDP)
    /// Local port for inbound OSC commands.
    pub control_listen_port: u16,
    /// Host receiving outbound `/playerstate` messages.
    pub control_remote_host: String,
    /// Port receiving outbound `/playerstate` messages.
    pub control_remote_port: u16,
    /// Optional namespace in front of inbound addresses (e.g. `/deovr`).
    pub address_prefix: String,

    // Connection lifecycle
    /// Period between keep-alive frames (ms).
    pub heartbeat_interval_ms: u64,
    /// Consecutive connection failures tolerated before giving up.
    pub max_connect_attempts: u32,
    /// Timeout for a single connect attempt (ms).
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_host: String::new(),
            device_port: DEVICE_PORT,
            control_listen_port: CONTROL_LISTEN_PORT,
            control_remote_host: "127.0.0.1".to_string(),
            control_remote_port: CONTROL_REMOTE_PORT,
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            max_connect_attempts: MAX_CONNECT_ATTEMPTS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing device host or values that would
    /// stall the connection lifecycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_host.trim().is_empty() {
            return Err(ConfigError::MissingDeviceHost);
        }
        if self.control_remote_host.trim().is_empty() {
            return Err(ConfigError::InvalidRemote("empty host".to_string()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "heartbeat_interval_ms must be >= 1".to_string(),
            ));
        }
        if self.heartbeat_interval_ms >= DEVICE_IDLE_TIMEOUT_SECS * 1000 {
            return Err(ConfigError::InvalidSetting(format!(
                "heartbeat_interval_ms must be below the device idle timeout ({}s)",
                DEVICE_IDLE_TIMEOUT_SECS
            )));
        }
        if self.max_connect_attempts == 0 {
            return Err(ConfigError::InvalidSetting(
                "max_connect_attempts must be >= 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "connect_timeout_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies a combined "host[:port]" remote target.
    pub fn set_remote_target(&mut self, target: &str) -> Result<(), ConfigError> {
        let (host, port) = parse_remote_target(target)?;
        self.control_remote_host = host;
        if let Some(port) = port {
            self.control_remote_port = port;
        }
        Ok(())
    }

    /// Returns `host:port` of the device.
    #[must_use]
    pub fn device_addr(&self) -> String {
        format!("{}:{}", self.device_host, self.device_port)
    }
}

/// Splits a "host[:port]" parameter.
///
/// IPv6 hosts must be bracketed when a port is given (`[::1]:8888`); a bare
/// IPv6 address is taken as a host without port.
pub fn parse_remote_target(target: &str) -> Result<(String, Option<u16>), ConfigError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ConfigError::InvalidRemote("empty target".to_string()));
    }

    if let Some(rest) = target.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::InvalidRemote(target.to_string()))?;
        if host.is_empty() {
            return Err(ConfigError::InvalidRemote(target.to_string()));
        }
        return match tail {
            "" => Ok((host.to_string(), None)),
            _ => {
                let port = tail
                    .strip_prefix(':')
                    .ok_or_else(|| ConfigError::InvalidRemote(target.to_string()))?;
                Ok((host.to_string(), Some(parse_port(target, port)?)))
            }
        };
    }

    match target.split_once(':') {
        // More than one colon: an unbracketed IPv6 address.
        Some((_, rest)) if rest.contains(':') => Ok((target.to_string(), None)),
        Some((host, port)) if !host.is_empty() => {
            Ok((host.to_string(), Some(parse_port(target, port)?)))
        }
        Some(_) => Err(ConfigError::InvalidRemote(target.to_string())),
        None => Ok((target.to_string(), None)),
    }
}

fn parse_port(target: &str, port: &str) -> Result<u16, ConfigError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidRemote(format!(
            "{} (bad port {:?})",
            target, port
        ))),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            device_host: "192.168.1.20".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_protocol_ports() {
        let config = Config::default();
        assert_eq!(config.device_port, 23554);
        assert_eq!(config.control_listen_port, 9999);
        assert_eq!(config.control_remote_port, 8888);
        assert_eq!(config.heartbeat_interval_ms, 1000);
        assert_eq!(config.max_connect_attempts, 3);
    }

    #[test]
    fn missing_device_host_is_rejected() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingDeviceHost)
        );
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn heartbeat_must_beat_idle_timeout() {
        let config = Config {
            heartbeat_interval_ms: 3000,
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting(_))
        ));
    }

    #[test]
    fn remote_target_with_port() {
        assert_eq!(
            parse_remote_target("10.0.0.5:9000"),
            Ok(("10.0.0.5".to_string(), Some(9000)))
        );
    }

    #[test]
    fn remote_target_without_port() {
        assert_eq!(
            parse_remote_target("studio.local"),
            Ok(("studio.local".to_string(), None))
        );
    }

    #[test]
    fn remote_target_ipv6() {
        assert_eq!(
            parse_remote_target("[::1]:8000"),
            Ok(("::1".to_string(), Some(8000)))
        );
        assert_eq!(
            parse_remote_target("fe80::1"),
            Ok(("fe80::1".to_string(), None))
        );
    }

    #[test]
    fn remote_target_rejects_bad_ports() {
        assert!(parse_remote_target("host:").is_err());
        assert!(parse_remote_target("host:0").is_err());
        assert!(parse_remote_target("host:70000").is_err());
        assert!(parse_remote_target(":8888").is_err());
        assert!(parse_remote_target("[::1]x").is_err());
    }

    #[test]
    fn set_remote_target_keeps_default_port() {
        let mut config = valid();
        config.set_remote_target("10.0.0.9").unwrap();
        assert_eq!(config.control_remote_host, "10.0.0.9");
        assert_eq!(config.control_remote_port, 8888);
    }
}
