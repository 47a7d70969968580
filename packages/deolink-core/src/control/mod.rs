//! OSC control side of the bridge.
//!
//! Inbound OSC messages from controllers (Chataigne, TouchDesigner, ...) are
//! routed to device commands; device status is translated into outbound
//! `/playerstate` messages. Delivery is fire-and-forget UDP.

use thiserror::Error;

use crate::device::{DeviceCommand, DeviceHandle};

pub mod router;
pub mod transport;

pub use router::{ControlRouter, Route};
pub use transport::{decode_packet, resolve_target, run_control_listener, UdpControlSender};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors on the OSC side. Logged, never fatal once running.
#[derive(Debug, Error)]
pub enum ControlError {
    /// An outbound message could not be encoded.
    #[error("failed to encode OSC packet: {0:?}")]
    Encode(rosc::OscError),

    /// An inbound datagram is not a valid OSC packet.
    #[error("failed to decode OSC packet: {0:?}")]
    Decode(rosc::OscError),

    /// The datagram could not be handed to the socket.
    #[error("failed to send OSC packet: {0}")]
    Send(#[from] std::io::Error),

    /// The sender has been closed.
    #[error("OSC sender is closed")]
    Closed,
}

/// Convenient Result alias for OSC operations.
pub type ControlResult<T> = Result<T, ControlError>;

// ─────────────────────────────────────────────────────────────────────────────
// Seams
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound OSC transport.
pub trait ControlSender: Send + Sync {
    /// Sends one message without waiting for delivery.
    fn send(&self, message: &rosc::OscMessage) -> ControlResult<()>;

    /// Releases the underlying socket. Safe to call repeatedly.
    fn close(&self);
}

/// The operations the router needs from the device connection.
pub trait DeviceControl: Send + Sync {
    /// Queues a command for the device.
    fn send_command(&self, command: DeviceCommand);

    /// Requests a full teardown and reconnect with a fresh retry budget.
    fn reconnect(&self);
}

impl DeviceControl for DeviceHandle {
    fn send_command(&self, command: DeviceCommand) {
        DeviceHandle::send_command(self, command);
    }

    fn reconnect(&self) {
        DeviceHandle::reconnect(self);
    }
}
