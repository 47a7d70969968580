//! UDP transport for OSC.
//!
//! Outbound messages are fire-and-forget: [`UdpControlSender`] hands each
//! datagram to the socket without waiting, and a full socket buffer simply
//! drops the message.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use rosc::{OscMessage, OscPacket};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::router::ControlRouter;
use super::{ControlError, ControlResult, ControlSender, DeviceControl};
use crate::error::ErrorCode;

/// Sends OSC messages to one remote `host:port`.
pub struct UdpControlSender {
    socket: Mutex<Option<UdpSocket>>,
    target: SocketAddr,
}

impl UdpControlSender {
    /// Binds an ephemeral local socket for sending to `target`.
    pub async fn bind(target: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            socket: Mutex::new(Some(socket)),
            target,
        })
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl ControlSender for UdpControlSender {
    fn send(&self, message: &OscMessage) -> ControlResult<()> {
        let bytes = rosc::encoder::encode(&OscPacket::Message(message.clone()))
            .map_err(ControlError::Encode)?;

        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(ControlError::Closed)?;
        socket.try_send_to(&bytes, self.target)?;

        log::debug!(
            "[Control] Sent {} {:?} to {}",
            message.addr,
            message.args,
            self.target
        );
        Ok(())
    }

    fn close(&self) {
        if self.socket.lock().take().is_some() {
            log::info!("[Control] OSC sender to {} closed", self.target);
        }
    }
}

/// Resolves `host:port` to the first matching socket address.
pub async fn resolve_target(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}:{}", host, port),
            )
        })
}

/// Decodes one inbound datagram.
pub fn decode_packet(datagram: &[u8]) -> ControlResult<OscPacket> {
    rosc::decoder::decode_udp(datagram)
        .map(|(_, packet)| packet)
        .map_err(ControlError::Decode)
}

/// Receives OSC datagrams on `socket` and dispatches them until cancelled.
///
/// The socket is dropped (and the port released) when the loop ends.
pub async fn run_control_listener(
    socket: UdpSocket,
    router: Arc<ControlRouter>,
    device: Arc<dyn DeviceControl>,
    cancel: CancellationToken,
) {
    if let Ok(addr) = socket.local_addr() {
        log::info!("[Control] OSC server is listening on {}", addr);
    }

    let mut buf = vec![0u8; rosc::decoder::MTU];
    loop {
        let (len, from) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    log::warn!("[Control] Receive failed: {}", e);
                    continue;
                }
            },
        };

        match decode_packet(&buf[..len]) {
            Ok(packet) => router.dispatch_packet(&packet, device.as_ref()),
            Err(e) => log::warn!(
                "[Control] Dropping datagram from {} ({}): {}",
                from,
                e.code(),
                e
            ),
        }
    }

    log::info!("[Control] OSC listener stopped");
}
