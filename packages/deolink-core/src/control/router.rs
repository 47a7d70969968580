//! Translation between OSC messages and the device protocol.
//!
//! Inbound routing table (after stripping the optional namespace prefix):
//!
//! | address        | effect                                   |
//! |----------------|------------------------------------------|
//! | `/play`        | `{playerState: 0}`                       |
//! | `/pause`       | `{playerState: 1}`                       |
//! | `/seek/play`   | `{playerState: 0, currentTime: arg0}`    |
//! | `/seek/pause`  | `{playerState: 1, currentTime: arg0}`    |
//! | `/load/path`   | `{path: arg0}`                           |
//! | `/reconnect/tcp` | manual reconnect, no device command    |
//!
//! Outbound, every decoded status becomes one `/playerstate` message with
//! args `[path, duration, currentTime, playerState]`, limited to the fields
//! the status actually carries. When nothing usable was decoded the single
//! argument `-1` is sent instead.

use std::sync::Arc;

use rosc::{OscMessage, OscPacket, OscType};

use super::{ControlSender, DeviceControl};
use crate::device::{DeviceCommand, DeviceStatus, PlayerState, StatusEmitter, StatusReport};
use crate::error::ErrorCode;
use crate::protocol_constants::{NO_STATUS_SENTINEL, PLAYERSTATE_ADDRESS};

/// What an inbound OSC message asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Forward this command to the device.
    Command(DeviceCommand),
    /// Tear down and reconnect the device connection.
    Reconnect,
    /// Unknown address or unusable arguments; dropped.
    Unroutable,
}

/// Routes OSC messages to the device and device status back out as OSC.
pub struct ControlRouter {
    sender: Arc<dyn ControlSender>,
    prefix: String,
}

impl ControlRouter {
    /// Creates a router sending status through `sender`.
    ///
    /// `prefix` is an optional namespace (e.g. `/deovr`) accepted in front of
    /// every inbound address; unprefixed addresses are accepted too.
    pub fn new(sender: Arc<dyn ControlSender>, prefix: &str) -> Self {
        let prefix = prefix.trim().trim_end_matches('/');
        let prefix = match prefix {
            "" => String::new(),
            p if p.starts_with('/') => p.to_string(),
            p => format!("/{}", p),
        };
        Self { sender, prefix }
    }

    /// Maps one inbound message to a [`Route`].
    #[must_use]
    pub fn route(&self, message: &OscMessage) -> Route {
        let address = self.local_address(&message.addr);
        let arg0 = message.args.first();

        match address {
            "play" => Route::Command(DeviceCommand::play()),
            "pause" => Route::Command(DeviceCommand::pause()),
            "seek/play" => Route::Command(DeviceCommand::seek(PlayerState::Play, seek_time(arg0))),
            "seek/pause" => {
                Route::Command(DeviceCommand::seek(PlayerState::Pause, seek_time(arg0)))
            }
            "load/path" => match arg0 {
                Some(OscType::String(path)) if !path.is_empty() => {
                    Route::Command(DeviceCommand::load(path.as_str()))
                }
                other => {
                    log::warn!("[Control] {} needs a path argument, got {:?}", message.addr, other);
                    Route::Unroutable
                }
            },
            "reconnect" | "reconnect/tcp" => Route::Reconnect,
            _ => {
                log::debug!("[Control] Unroutable address {}", message.addr);
                Route::Unroutable
            }
        }
    }

    /// Routes one message and acts on the result.
    pub fn dispatch(&self, message: &OscMessage, device: &dyn DeviceControl) {
        log::info!("[Control] Message: {} {:?}", message.addr, message.args);

        match self.route(message) {
            Route::Command(command) => device.send_command(command),
            Route::Reconnect => device.reconnect(),
            Route::Unroutable => {}
        }
    }

    /// Dispatches every message in a packet, flattening bundles in order.
    pub fn dispatch_packet(&self, packet: &OscPacket, device: &dyn DeviceControl) {
        match packet {
            OscPacket::Message(message) => self.dispatch(message, device),
            OscPacket::Bundle(bundle) => {
                for inner in &bundle.content {
                    self.dispatch_packet(inner, device);
                }
            }
        }
    }

    /// Builds the outbound message for a decoded report.
    ///
    /// Heartbeats produce nothing.
    #[must_use]
    pub fn status_message(report: &StatusReport) -> Option<OscMessage> {
        match report {
            StatusReport::Heartbeat => None,
            StatusReport::Status(status) if !status.is_empty() => Some(OscMessage {
                addr: PLAYERSTATE_ADDRESS.to_string(),
                args: status_args(status),
            }),
            StatusReport::Status(_) | StatusReport::Undecodable(_) => Some(no_status_message()),
        }
    }

    /// Releases the outbound socket.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Strips the namespace prefix and leading slash.
    fn local_address<'a>(&self, address: &'a str) -> &'a str {
        let address = if self.prefix.is_empty() {
            address
        } else {
            match address.strip_prefix(self.prefix.as_str()) {
                Some(rest) if rest.starts_with('/') => rest,
                _ => address,
            }
        };
        address.trim_start_matches('/')
    }
}

impl StatusEmitter for ControlRouter {
    fn emit_status(&self, report: StatusReport) {
        let Some(message) = Self::status_message(&report) else {
            return;
        };
        if let Err(e) = self.sender.send(&message) {
            log::warn!("[Control] Failed to send {} ({}): {}", message.addr, e.code(), e);
        }
    }
}

/// Ordered `[path, duration, currentTime, playerState]`, skipping absent fields.
fn status_args(status: &DeviceStatus) -> Vec<OscType> {
    let mut args = Vec::with_capacity(4);
    if let Some(path) = &status.path {
        args.push(OscType::String(path.clone()));
    }
    if let Some(duration) = status.duration {
        args.push(OscType::Float(duration as f32));
    }
    if let Some(current_time) = status.current_time {
        args.push(OscType::Float(current_time as f32));
    }
    if let Some(player_state) = status.player_state {
        args.push(OscType::Int(player_state));
    }
    args
}

fn no_status_message() -> OscMessage {
    OscMessage {
        addr: PLAYERSTATE_ADDRESS.to_string(),
        args: vec![OscType::Int(NO_STATUS_SENTINEL)],
    }
}

/// Reads a seek time (seconds) from any numeric OSC argument.
fn seek_time(arg: Option<&OscType>) -> Option<f64> {
    let time = match arg? {
        OscType::Float(v) => f64::from(*v),
        OscType::Double(v) => *v,
        OscType::Int(v) => f64::from(*v),
        OscType::Long(v) => *v as f64,
        OscType::String(s) => s.trim().parse().ok()?,
        other => {
            log::warn!("[Control] Ignoring non-numeric seek argument {:?}", other);
            return None;
        }
    };
    time.is_finite().then_some(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlError, ControlResult};
    use crate::device::FrameError;
    use parking_lot::Mutex;
    use rosc::{OscBundle, OscTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<OscMessage>>,
        fail: bool,
    }

    impl ControlSender for RecordingSender {
        fn send(&self, message: &OscMessage) -> ControlResult<()> {
            if self.fail {
                return Err(ControlError::Closed);
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }

        fn close(&self) {}
    }

    #[derive(Default)]
    struct RecordingDevice {
        commands: Mutex<Vec<DeviceCommand>>,
        reconnects: AtomicUsize,
    }

    impl DeviceControl for RecordingDevice {
        fn send_command(&self, command: DeviceCommand) {
            self.commands.lock().push(command);
        }

        fn reconnect(&self) {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn router() -> (ControlRouter, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let router = ControlRouter::new(Arc::clone(&sender) as Arc<dyn ControlSender>, "/deovr");
        (router, sender)
    }

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn play_and_pause_set_player_state_only() {
        let (router, _) = router();
        assert_eq!(
            router.route(&msg("/play", vec![])),
            Route::Command(DeviceCommand::play())
        );
        assert_eq!(
            router.route(&msg("/deovr/pause", vec![])),
            Route::Command(DeviceCommand::pause())
        );
    }

    #[test]
    fn seek_play_produces_exact_command() {
        let (router, _) = router();
        let route = router.route(&msg("/seek/play", vec![OscType::Float(12.5)]));
        let Route::Command(command) = route else {
            panic!("expected command, got {:?}", route);
        };
        assert_eq!(
            command,
            DeviceCommand {
                player_state: Some(PlayerState::Play),
                current_time: Some(12.5),
                path: None,
            }
        );
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"playerState":0,"currentTime":12.5}"#
        );
    }

    #[test]
    fn seek_accepts_any_numeric_argument() {
        let (router, _) = router();
        for arg in [
            OscType::Double(4.0),
            OscType::Int(4),
            OscType::Long(4),
            OscType::String(" 4 ".to_string()),
        ] {
            assert_eq!(
                router.route(&msg("/deovr/seek/pause", vec![arg])),
                Route::Command(DeviceCommand::seek(PlayerState::Pause, Some(4.0)))
            );
        }
    }

    #[test]
    fn seek_without_time_degrades_to_state_change() {
        let (router, _) = router();
        assert_eq!(
            router.route(&msg("/seek/pause", vec![])),
            Route::Command(DeviceCommand::seek(PlayerState::Pause, None))
        );
        assert_eq!(
            router.route(&msg("/seek/play", vec![OscType::Bool(true)])),
            Route::Command(DeviceCommand::seek(PlayerState::Play, None))
        );
    }

    #[test]
    fn load_path_requires_a_string() {
        let (router, _) = router();
        assert_eq!(
            router.route(&msg("/load/path", vec![OscType::String("a.mp4".into())])),
            Route::Command(DeviceCommand::load("a.mp4"))
        );
        assert_eq!(
            router.route(&msg("/load/path", vec![OscType::Int(3)])),
            Route::Unroutable
        );
    }

    #[test]
    fn unknown_and_foreign_addresses_are_unroutable() {
        let (router, _) = router();
        assert_eq!(router.route(&msg("/volume", vec![])), Route::Unroutable);
        // Prefix must end at a path boundary.
        assert_eq!(router.route(&msg("/deovrplay", vec![])), Route::Unroutable);
    }

    #[test]
    fn reconnect_triggers_manual_reconnect_only() {
        let (router, _) = router();
        let device = RecordingDevice::default();

        router.dispatch(&msg("/deovr/reconnect/tcp", vec![]), &device);
        router.dispatch(&msg("/reconnect", vec![]), &device);

        assert_eq!(device.reconnects.load(Ordering::SeqCst), 2);
        assert!(device.commands.lock().is_empty());
    }

    #[test]
    fn bundles_are_dispatched_in_order() {
        let (router, _) = router();
        let device = RecordingDevice::default();
        let packet = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(msg("/seek/pause", vec![OscType::Float(1.0)])),
                OscPacket::Message(msg("/unknown", vec![])),
                OscPacket::Message(msg("/play", vec![])),
            ],
        });

        router.dispatch_packet(&packet, &device);

        assert_eq!(
            *device.commands.lock(),
            vec![
                DeviceCommand::seek(PlayerState::Pause, Some(1.0)),
                DeviceCommand::play()
            ]
        );
    }

    #[test]
    fn prefix_is_normalised() {
        let sender: Arc<dyn ControlSender> = Arc::new(RecordingSender::default());
        let router = ControlRouter::new(sender, "deovr/");
        assert_eq!(
            router.route(&msg("/deovr/play", vec![])),
            Route::Command(DeviceCommand::play())
        );
    }

    #[test]
    fn partial_status_keeps_field_order_without_placeholders() {
        let status = DeviceStatus {
            path: Some("a.mp4".to_string()),
            duration: None,
            current_time: Some(3.2),
            player_state: Some(1),
        };
        let message = ControlRouter::status_message(&StatusReport::Status(status)).unwrap();
        assert_eq!(message.addr, "/playerstate");
        assert_eq!(
            message.args,
            vec![
                OscType::String("a.mp4".to_string()),
                OscType::Float(3.2),
                OscType::Int(1)
            ]
        );
    }

    #[test]
    fn full_status_sends_all_four_args() {
        let status = DeviceStatus {
            path: Some("b.mp4".to_string()),
            duration: Some(90.0),
            current_time: Some(10.0),
            player_state: Some(0),
        };
        let message = ControlRouter::status_message(&StatusReport::Status(status)).unwrap();
        assert_eq!(message.args.len(), 4);
        assert_eq!(message.args[1], OscType::Float(90.0));
    }

    #[test]
    fn undecodable_and_empty_status_send_sentinel() {
        let sentinel = vec![OscType::Int(-1)];
        let report = StatusReport::Undecodable(FrameError::MissingObjectStart);
        assert_eq!(ControlRouter::status_message(&report).unwrap().args, sentinel);

        let report = StatusReport::Status(DeviceStatus::default());
        assert_eq!(ControlRouter::status_message(&report).unwrap().args, sentinel);
    }

    #[test]
    fn heartbeat_sends_nothing() {
        let (router, sender) = router();
        router.emit_status(StatusReport::Heartbeat);
        assert!(sender.sent.lock().is_empty());
        assert!(ControlRouter::status_message(&StatusReport::Heartbeat).is_none());
    }

    #[test]
    fn emitted_status_goes_out_through_sender() {
        let (router, sender) = router();
        router.emit_status(StatusReport::Status(DeviceStatus {
            player_state: Some(0),
            ..Default::default()
        }));
        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].args, vec![OscType::Int(0)]);
    }

    #[test]
    fn send_failures_are_absorbed() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let router = ControlRouter::new(sender, "");
        router.emit_status(StatusReport::Status(DeviceStatus {
            player_state: Some(1),
            ..Default::default()
        }));
    }
}
