//! Centralized error types for the Deolink core library.
//!
//! Each side of the bridge has its own error enum; [`BridgeError`] is what
//! escapes to the binary. Only configuration and startup failures reach it:
//! transport errors drive the retry budget and frame/OSC errors are logged
//! where they happen.

use thiserror::Error;

use crate::config::ConfigError;
use crate::control::ControlError;
use crate::device::{FrameError, TransportError};

/// Trait for error types that provide machine-readable error codes.
///
/// Used as a stable tag in log lines.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect_failed",
            Self::Timeout(_) => "connect_timeout",
            Self::Io(_) => "connection_io",
        }
    }
}

impl ErrorCode for FrameError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingObjectStart => "frame_malformed",
            Self::Parse(_) => "frame_parse_error",
            Self::Encode(_) => "frame_encode_error",
            Self::TooLarge(_) => "frame_too_large",
        }
    }
}

impl ErrorCode for ControlError {
    fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "osc_encode_error",
            Self::Decode(_) => "osc_decode_error",
            Self::Send(_) => "osc_send_failed",
            Self::Closed => "osc_sender_closed",
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingDeviceHost => "missing_device_host",
            Self::InvalidRemote(_) => "invalid_remote",
            Self::InvalidSetting(_) => "invalid_setting",
        }
    }
}

/// Errors that stop the bridge from starting.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Startup parameters are missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A socket could not be bound or an address could not be resolved.
    #[error("Network error: {0}")]
    Network(String),

    /// The OSC side failed during setup.
    #[error("Control error: {0}")]
    Control(#[from] ControlError),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(e) => e.code(),
            Self::Network(_) => "network_error",
            Self::Control(e) => e.code(),
        }
    }
}

/// Convenient Result alias for bridge-level operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_keeps_inner_code() {
        let err = BridgeError::from(ConfigError::MissingDeviceHost);
        assert_eq!(err.code(), "missing_device_host");
        assert_eq!(
            err.to_string(),
            "Configuration error: device host is required"
        );
    }

    #[test]
    fn transport_errors_have_codes() {
        let err = TransportError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(err.code(), "connect_timeout");
        assert_eq!(FrameError::MissingObjectStart.code(), "frame_malformed");
    }
}
