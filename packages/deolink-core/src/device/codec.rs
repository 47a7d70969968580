//! Length-prefixed JSON framing for the DeoVR remote-control protocol.
//!
//! Every frame is a 4-byte **little-endian** `u32` length followed by that
//! many bytes of UTF-8 JSON. The length counts only the JSON bytes.
//!
//! ```text
//! +----------------+------------------+
//! | Length (4B LE) | JSON Payload     |
//! +----------------+------------------+
//! ```
//!
//! TCP delivers a byte stream, so inbound data first goes through
//! [`FrameSplitter`], which cuts it into whole frames on the length prefix.
//! Each frame is then handed to [`decode`].
//!
//! DeoVR is loose about what it sends back: keep-alive echoes may be
//! undersized and status payloads vary with what is loaded. [`decode`]
//! therefore strips the fixed header, locates the first `{` in the payload
//! and parses a single JSON value from there.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::codec::{Decoder, LengthDelimitedCodec};

use super::types::{DeviceStatus, StatusReport};
use super::{FrameError, FrameResult};
use crate::protocol_constants::{FRAME_HEADER_LEN, MAX_FRAME_LEN};

/// Encodes `payload` as a length-prefixed JSON frame.
pub fn encode<T: Serialize>(payload: &T) -> FrameResult<Bytes> {
    let json = serde_json::to_vec(payload).map_err(FrameError::Encode)?;
    let len = u32::try_from(json.len()).map_err(|_| FrameError::TooLarge(json.len()))?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + json.len());
    frame.put_u32_le(len);
    frame.put_slice(&json);
    Ok(frame.freeze())
}

/// Returns the empty keep-alive frame (length 0, no payload).
#[must_use]
pub fn encode_heartbeat() -> Bytes {
    Bytes::from_static(&[0u8; FRAME_HEADER_LEN])
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Framing
// ─────────────────────────────────────────────────────────────────────────────

/// Splits the inbound byte stream into whole frames, header included.
///
/// Coalesced frames come out one by one and a frame split across reads is
/// held back until complete. A fragment shorter than a header left over when
/// the device closes is passed on as-is (a truncated keep-alive echo).
#[derive(Debug)]
pub struct FrameSplitter {
    inner: LengthDelimitedCodec,
}

impl FrameSplitter {
    #[must_use]
    pub fn new() -> Self {
        let inner = LengthDelimitedCodec::builder()
            .little_endian()
            .length_field_length(FRAME_HEADER_LEN)
            .max_frame_length(MAX_FRAME_LEN)
            .length_adjustment(FRAME_HEADER_LEN as isize)
            .num_skip(0)
            .new_codec();
        Self { inner }
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameSplitter {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        Ok(self.inner.decode(src)?.map(BytesMut::freeze))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None if src.len() < FRAME_HEADER_LEN => Ok(Some(src.split().freeze())),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("device closed mid-frame ({} bytes pending)", src.len()),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decodes one inbound frame into a [`StatusReport`].
///
/// Never fails: undersized buffers are heartbeats, unusable payloads are
/// reported as [`StatusReport::Undecodable`], and missing or mistyped fields
/// only narrow the resulting status.
#[must_use]
pub fn decode(buffer: &[u8]) -> StatusReport {
    if is_heartbeat(buffer) {
        return StatusReport::Heartbeat;
    }

    match locate_object(buffer) {
        Ok(object) => StatusReport::Status(extract_status(&object)),
        Err(e) => StatusReport::Undecodable(e),
    }
}

/// Keep-alive echoes are either shorter than a header or a bare zero header.
fn is_heartbeat(buffer: &[u8]) -> bool {
    buffer.len() < FRAME_HEADER_LEN
        || (buffer.len() == FRAME_HEADER_LEN && buffer.iter().all(|&b| b == 0))
}

/// Strips the header, finds the first `{` and parses one JSON object from it.
///
/// Padding after the object inside the same frame is ignored.
fn locate_object(buffer: &[u8]) -> FrameResult<Map<String, Value>> {
    let text = String::from_utf8_lossy(&buffer[FRAME_HEADER_LEN..]);
    let start = text.find('{').ok_or(FrameError::MissingObjectStart)?;

    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(Value::Object(map))) => Ok(map),
        // A value starting at '{' can only be an object.
        Some(Ok(_)) | None => Err(FrameError::MissingObjectStart),
        Some(Err(e)) => Err(FrameError::Parse(e)),
    }
}

/// Picks the known fields out of a parsed object, skipping any of the wrong shape.
fn extract_status(object: &Map<String, Value>) -> DeviceStatus {
    DeviceStatus {
        path: object
            .get("path")
            .and_then(Value::as_str)
            .map(str::to_string),
        duration: object.get("duration").and_then(Value::as_f64),
        current_time: object.get("currentTime").and_then(Value::as_f64),
        player_state: object
            .get("playerState")
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok()),
    }
}
