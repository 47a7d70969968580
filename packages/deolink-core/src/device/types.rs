//! Types exchanged with the DeoVR remote-control API.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::FrameError;

/// Playback state as encoded by DeoVR (`0` = play, `1` = pause).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerState {
    Play,
    Pause,
}

impl From<PlayerState> for u8 {
    fn from(state: PlayerState) -> Self {
        match state {
            PlayerState::Play => 0,
            PlayerState::Pause => 1,
        }
    }
}

impl TryFrom<u8> for PlayerState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Play),
            1 => Ok(Self::Pause),
            other => Err(format!("unknown player state: {}", other)),
        }
    }
}

/// Status reported by the device.
///
/// DeoVR omits fields depending on what is loaded (no media means no path or
/// duration), so every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_state: Option<i32>,
}

impl DeviceStatus {
    /// Returns true if no field survived extraction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_none()
            && self.duration.is_none()
            && self.current_time.is_none()
            && self.player_state.is_none()
    }
}

/// Command sent to the device.
///
/// Only the fields relevant to the requested action are set. Unset fields
/// are left out of the JSON payload rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_state: Option<PlayerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DeviceCommand {
    /// Resumes playback of the active video.
    #[must_use]
    pub fn play() -> Self {
        Self {
            player_state: Some(PlayerState::Play),
            ..Default::default()
        }
    }

    /// Pauses the active video.
    #[must_use]
    pub fn pause() -> Self {
        Self {
            player_state: Some(PlayerState::Pause),
            ..Default::default()
        }
    }

    /// Jumps to `current_time` (seconds) and leaves the player in `state`.
    ///
    /// A `None` time degrades to a plain play/pause.
    #[must_use]
    pub fn seek(state: PlayerState, current_time: Option<f64>) -> Self {
        Self {
            player_state: Some(state),
            current_time,
            path: None,
        }
    }

    /// Loads the video at `path` (local path or URL).
    #[must_use]
    pub fn load(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Lifecycle state of the single device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Retrying,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of decoding one inbound buffer.
#[derive(Debug)]
pub enum StatusReport {
    /// Keep-alive echo; carries no status.
    Heartbeat,
    /// A status with whatever fields were present and valid.
    Status(DeviceStatus),
    /// No status could be extracted from the buffer.
    Undecodable(FrameError),
}
