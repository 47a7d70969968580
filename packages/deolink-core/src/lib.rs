//! Deolink Core - shared library for the Deolink bridge.
//!
//! Deolink connects a DeoVR player's remote-control TCP interface to any
//! OSC-speaking controller (Chataigne, TouchDesigner, a lighting desk, ...).
//! OSC commands are turned into length-prefixed JSON frames for the player,
//! and the player's status frames are turned back into OSC messages.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`device`]: Wire codec and TCP connection lifecycle for the player
//! - [`control`]: OSC routing and UDP transport
//! - [`config`]: Bridge configuration and validation
//! - [`bootstrap`]: Wiring of the above into a running bridge
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`DeviceConnector`](device::DeviceConnector): Opening the device stream
//! - [`StatusEmitter`](device::StatusEmitter): Consuming decoded device reports
//! - [`ControlSender`](control::ControlSender): Outbound OSC delivery
//! - [`DeviceControl`](control::DeviceControl): Routing commands to the device
//!
//! Each trait has a network implementation used by the server binary; tests
//! substitute in-memory doubles.

#![warn(clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod protocol_constants;

// Re-export commonly used types at the crate root
pub use config::{parse_remote_target, Config, ConfigError};
pub use error::{BridgeError, BridgeResult, ErrorCode};

// Re-export device types
pub use device::{
    ConnectionState, DeviceCommand, DeviceHandle, DeviceStatus, PlayerState, StatusReport,
};

// Re-export control types
pub use control::{ControlRouter, Route};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_bridge, bootstrap_bridge_with_connector, BootstrappedBridge};
