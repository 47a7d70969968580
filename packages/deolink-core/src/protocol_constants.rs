//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the DeoVR remote-control API and the OSC
//! conventions our controllers expect. Changing them breaks interoperability.

// ─────────────────────────────────────────────────────────────────────────────
// DeoVR Remote Control (TCP)
// ─────────────────────────────────────────────────────────────────────────────

/// TCP port the DeoVR remote-control server listens on.
pub const DEVICE_PORT: u16 = 23554;

/// Size of the little-endian length prefix in front of every frame (bytes).
pub const FRAME_HEADER_LEN: usize = 4;

/// Interval between keep-alive frames (ms).
///
/// DeoVR drops clients after 3 seconds of silence, so one frame per second
/// leaves room for two lost ticks.
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Idle period after which DeoVR closes a silent client (seconds).
pub const DEVICE_IDLE_TIMEOUT_SECS: u64 = 3;

/// Connection attempts allowed before the connection is marked failed.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Timeout for a single TCP connect attempt (ms).
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Read buffer size for inbound device data (bytes).
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Largest inbound payload accepted from the device (bytes).
///
/// A larger length field means the stream is out of sync.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Upper bound for writing one frame to the device (ms).
pub const WRITE_TIMEOUT_MS: u64 = 2000;

// ─────────────────────────────────────────────────────────────────────────────
// OSC (UDP)
// ─────────────────────────────────────────────────────────────────────────────

/// Local UDP port for inbound OSC commands.
pub const CONTROL_LISTEN_PORT: u16 = 9999;

/// Remote UDP port for outbound OSC status messages.
pub const CONTROL_REMOTE_PORT: u16 = 8888;

/// Namespace prefix used by existing controller patches (`/deovr/play`, ...).
pub const DEFAULT_ADDRESS_PREFIX: &str = "/deovr";

/// Address of the outbound status message.
pub const PLAYERSTATE_ADDRESS: &str = "/playerstate";

/// Single argument sent in place of a status when none could be decoded.
pub const NO_STATUS_SENTINEL: i32 = -1;
