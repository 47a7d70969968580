//! Transport abstraction for the device connection.
//!
//! The connection manager only needs "give me a fresh byte stream to the
//! device". Keeping that behind [`DeviceConnector`] lets tests substitute
//! in-memory duplex streams for real sockets.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Byte stream to the device.
pub trait DeviceIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DeviceIo for T {}

/// Owned, type-erased device stream.
pub type BoxedDeviceIo = Box<dyn DeviceIo>;

/// Opens new connections to the device.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Opens a new stream. Each call must produce an independent connection.
    async fn connect(&self) -> io::Result<BoxedDeviceIo>;

    /// Human-readable peer description for logging.
    fn peer(&self) -> String;
}

/// TCP connector for the DeoVR remote-control port.
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    /// Creates a connector for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn connect(&self) -> io::Result<BoxedDeviceIo> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        // Heartbeats are 4 bytes; don't let Nagle hold them back.
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Runs `connector.connect()` bounded by `timeout`.
///
/// The outer `Err` is the timeout, the inner one a refused or failed connect.
pub(crate) async fn connect_with_timeout(
    connector: &dyn DeviceConnector,
    timeout: Duration,
) -> Result<io::Result<BoxedDeviceIo>, tokio::time::error::Elapsed> {
    tokio::time::timeout(timeout, connector.connect()).await
}
