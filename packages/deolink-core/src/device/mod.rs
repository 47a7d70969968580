//! DeoVR device side of the bridge.
//!
//! Covers the length-prefixed JSON wire format, the TCP connection lifecycle
//! (connect, heartbeat, bounded retry, manual reconnect) and the types that
//! cross the device boundary.

use std::time::Duration;

use thiserror::Error;

pub mod codec;
pub mod connection;
pub mod heartbeat;
pub mod transport;
pub mod types;

pub use codec::{decode, encode, encode_heartbeat, FrameSplitter};
pub use connection::{
    spawn_connection_manager, ConnectionManager, ConnectionSettings, DeviceHandle, RetryBudget,
};
pub use heartbeat::HeartbeatTimer;
pub use transport::{BoxedDeviceIo, DeviceConnector, DeviceIo, TcpConnector};
pub use types::{ConnectionState, DeviceCommand, DeviceStatus, PlayerState, StatusReport};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Transport-level failures on the device connection.
///
/// These are the only device errors that consume the retry budget.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The TCP connect attempt was refused or failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The TCP connect attempt did not complete in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Reading from or writing to an established connection failed.
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while encoding or decoding a device frame.
///
/// Decode failures never tear the connection down.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No JSON object start was found after the length header.
    #[error("malformed frame: no JSON object after header")]
    MissingObjectStart,

    /// The located JSON object could not be parsed.
    #[error("failed to parse frame JSON: {0}")]
    Parse(#[source] serde_json::Error),

    /// The outbound payload could not be serialized.
    #[error("failed to serialize frame payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The outbound payload does not fit the 32-bit length field.
    #[error("frame payload too large: {0} bytes")]
    TooLarge(usize),
}

/// Convenient Result alias for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;

// ─────────────────────────────────────────────────────────────────────────────
// Seams
// ─────────────────────────────────────────────────────────────────────────────

/// Receives every decoded inbound report from the connection manager.
///
/// The router implements this to turn device status into OSC messages.
pub trait StatusEmitter: Send + Sync {
    /// Handles one decoded inbound buffer.
    fn emit_status(&self, report: StatusReport);
}

/// Builds a raw inbound frame around `json`.
#[cfg(test)]
pub(crate) fn raw_frame(json: &str) -> Vec<u8> {
    let mut buf = (json.len() as u32).to_le_bytes().to_vec();
    buf.extend_from_slice(json.as_bytes());
    buf
}
