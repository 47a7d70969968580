//! Device connection manager.
//!
//! A single actor task owns the TCP connection and its lifecycle state:
//!
//! ```text
//!                 connect()                success
//! Disconnected ──────────────▶ Connecting ─────────▶ Connected ──┐
//!      ▲                          │  ▲                  │         │ peer closed
//!      │                  error   │  │ budget left      │ error   │
//!      │                          ▼  │                  ▼         │
//!      │                        Retrying ◀──────────────┘         │
//!      │                          │ budget exhausted              │
//!      │    manual reconnect      ▼                               │
//!      └──────────────────────  Failed         Disconnected ◀─────┘
//! ```
//!
//! Everything that touches the connection (caller requests, inbound data,
//! reader errors, heartbeat ticks) is funnelled through one event loop, so
//! state is only ever mutated by one logical actor. Callers talk to it through
//! a cloneable [`DeviceHandle`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use super::codec::{self, FrameSplitter};
use super::heartbeat::HeartbeatTimer;
use super::transport::{connect_with_timeout, BoxedDeviceIo, DeviceConnector};
use super::types::{ConnectionState, DeviceCommand, StatusReport};
use super::{StatusEmitter, TransportError};
use crate::config::Config;
use crate::error::ErrorCode;
use crate::protocol_constants::{
    CONNECT_TIMEOUT_MS, FRAME_HEADER_LEN, HEARTBEAT_INTERVAL_MS, MAX_CONNECT_ATTEMPTS,
    READ_BUFFER_SIZE, WRITE_TIMEOUT_MS,
};

// ─────────────────────────────────────────────────────────────────────────────
// Retry Budget
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded budget of consecutive failed connection attempts.
///
/// Only a successful connect or a manual reconnect resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    attempts_used: u32,
}

impl RetryBudget {
    /// Creates a fresh budget allowing `max_attempts` failures.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts_used: 0,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }

    /// Records one failure. Returns true if another attempt is allowed.
    fn consume(&mut self) -> bool {
        if !self.is_exhausted() {
            self.attempts_used += 1;
        }
        !self.is_exhausted()
    }

    fn reset(&mut self) {
        self.attempts_used = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings & Events
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the connection manager.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Period between keep-alive frames.
    pub heartbeat_interval: Duration,
    /// Upper bound for a single connect attempt.
    pub connect_timeout: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Upper bound for writing one frame.
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            max_attempts: MAX_CONNECT_ATTEMPTS,
            write_timeout: Duration::from_millis(WRITE_TIMEOUT_MS),
        }
    }
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            max_attempts: config.max_connect_attempts,
            write_timeout: Duration::from_millis(WRITE_TIMEOUT_MS),
        }
    }
}

/// Events produced by per-connection tasks.
///
/// Each carries the generation of the connection that produced it; events
/// from a torn-down connection are discarded.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    Data { generation: u64, bytes: Bytes },
    Error { generation: u64, error: io::Error },
    Closed { generation: u64 },
    HeartbeatTick { generation: u64 },
}

/// Requests sent through a [`DeviceHandle`].
#[derive(Debug)]
pub(crate) enum DeviceRequest {
    Connect,
    Send(DeviceCommand),
    Reconnect,
}

enum Work {
    Event(LinkEvent),
    Request(DeviceRequest),
}

/// The live connection: write half plus the task draining the read half.
struct DeviceLink {
    generation: u64,
    writer: WriteHalf<BoxedDeviceIo>,
    reader: JoinHandle<()>,
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the device connection, its state and its retry budget.
pub struct ConnectionManager {
    connector: Arc<dyn DeviceConnector>,
    emitter: Arc<dyn StatusEmitter>,
    settings: ConnectionSettings,
    state: ConnectionState,
    retry: RetryBudget,
    link: Option<DeviceLink>,
    heartbeat: HeartbeatTimer,
    generation: u64,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    ///
    /// Returns the receiving end of the event queue that per-connection tasks
    /// feed; [`ConnectionManager::run`] drains it.
    pub(crate) fn new(
        connector: Arc<dyn DeviceConnector>,
        emitter: Arc<dyn StatusEmitter>,
        settings: ConnectionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let manager = Self {
            connector,
            emitter,
            settings,
            state: ConnectionState::Disconnected,
            retry: RetryBudget::new(settings.max_attempts),
            link: None,
            heartbeat: HeartbeatTimer::new(),
            generation: 0,
            events_tx,
            state_tx,
        };
        (manager, events_rx)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn retry_budget(&self) -> RetryBudget {
        self.retry
    }

    /// Subscribes to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Opens the connection, retrying immediately on failure until the
    /// budget runs out.
    pub async fn connect(&mut self) {
        loop {
            self.teardown();
            self.set_state(ConnectionState::Connecting);
            log::info!(
                "[Device] Connecting to {} (attempt {}/{})",
                self.connector.peer(),
                self.retry.attempts_used() + 1,
                self.retry.max_attempts()
            );

            let attempt =
                connect_with_timeout(self.connector.as_ref(), self.settings.connect_timeout).await;
            let error = match attempt {
                Ok(Ok(io)) => {
                    self.on_connected(io);
                    return;
                }
                Ok(Err(e)) => TransportError::Connect(e),
                Err(_) => TransportError::Timeout(self.settings.connect_timeout),
            };

            if !self.register_failure(&error) {
                return;
            }
        }
    }

    /// Handles a transport-level failure on the current connection.
    ///
    /// Consumes one attempt from the budget and reconnects while budget
    /// remains; otherwise parks the connection in `Failed`.
    pub async fn on_connection_error(&mut self, error: TransportError) {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting | ConnectionState::Retrying
        ) {
            log::debug!(
                "[Device] Ignoring transport error while {}: {}",
                self.state,
                error
            );
            return;
        }

        if self.register_failure(&error) {
            self.connect().await;
        }
    }

    /// Handles an orderly close from the device. Does not retry.
    pub fn on_connection_closed(&mut self) {
        log::info!("[Device] Connection closed by {}", self.connector.peer());
        self.heartbeat.stop();
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Decodes an inbound buffer and forwards anything but heartbeats.
    ///
    /// Decode failures are logged and forwarded; they never affect the connection.
    pub fn on_data_received(&self, buffer: &[u8]) {
        let report = codec::decode(buffer);
        match &report {
            StatusReport::Heartbeat => {
                log::trace!("[Device] Heartbeat echo ({} bytes)", buffer.len());
                return;
            }
            StatusReport::Undecodable(e) => {
                log::warn!(
                    "[Device] Undecodable frame ({} bytes, {}): {}",
                    buffer.len(),
                    e.code(),
                    e
                );
            }
            StatusReport::Status(status) => {
                log::debug!("[Device] Status: {:?}", status);
            }
        }
        self.emitter.emit_status(report);
    }

    /// Encodes and writes a command. Dropped with a warning unless connected.
    pub async fn send_command(&mut self, command: &DeviceCommand) {
        if self.state != ConnectionState::Connected {
            log::warn!(
                "[Device] Not connected ({}), dropping command {:?}",
                self.state,
                command
            );
            return;
        }

        let frame = match codec::encode(command) {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("[Device] Failed to encode command {:?}: {}", command, e);
                return;
            }
        };

        log::info!(
            "[Device] Sending {}",
            String::from_utf8_lossy(&frame[FRAME_HEADER_LEN..])
        );

        if let Err(e) = self.write_frame(&frame).await {
            self.on_connection_error(TransportError::Io(e)).await;
        }
    }

    /// Tears the connection down and reconnects with a fresh budget,
    /// whatever the current state.
    pub async fn manual_reconnect(&mut self) {
        log::info!("[Device] Manual reconnect requested (was {})", self.state);
        self.retry.reset();
        self.heartbeat.stop();
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
        self.connect().await;
    }

    /// Stops the heartbeat and drops the connection. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.heartbeat.stop();
        if self.link.is_some() {
            log::info!("[Device] Closing connection to {}", self.connector.peer());
        }
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Runs the actor loop until cancelled or every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<DeviceRequest>,
        mut events: mpsc::UnboundedReceiver<LinkEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let work = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => Work::Event(event),
                request = requests.recv() => match request {
                    Some(request) => Work::Request(request),
                    None => break,
                },
            };

            // A connect in flight must not hold up shutdown.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.process(work) => {}
            }
        }

        self.shutdown();
        log::info!("[Device] Connection manager stopped");
    }

    async fn process(&mut self, work: Work) {
        match work {
            Work::Event(event) => self.handle_event(event).await,
            Work::Request(request) => self.handle_request(request).await,
        }
    }

    async fn handle_request(&mut self, request: DeviceRequest) {
        match request {
            DeviceRequest::Connect if self.state == ConnectionState::Connected => {
                log::debug!("[Device] Already connected");
            }
            DeviceRequest::Connect => self.connect().await,
            DeviceRequest::Send(command) => self.send_command(&command).await,
            DeviceRequest::Reconnect => self.manual_reconnect().await,
        }
    }

    pub(crate) async fn handle_event(&mut self, event: LinkEvent) {
        let current = self.link.as_ref().map(|link| link.generation);

        match event {
            LinkEvent::Data { generation, bytes } if Some(generation) == current => {
                self.on_data_received(&bytes);
            }
            LinkEvent::Error { generation, error } if Some(generation) == current => {
                self.on_connection_error(TransportError::Io(error)).await;
            }
            LinkEvent::Closed { generation } if Some(generation) == current => {
                self.on_connection_closed();
            }
            LinkEvent::HeartbeatTick { generation } if Some(generation) == current => {
                self.on_heartbeat_tick().await;
            }
            stale => log::trace!("[Device] Discarding stale event {:?}", stale),
        }
    }

    async fn on_heartbeat_tick(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.write_frame(&codec::encode_heartbeat()).await {
            self.on_connection_error(TransportError::Io(e)).await;
        }
    }

    fn on_connected(&mut self, io: BoxedDeviceIo) {
        self.generation += 1;
        let generation = self.generation;

        let (reader, writer) = tokio::io::split(io);
        let reader = spawn_reader(generation, reader, self.events_tx.clone());
        self.link = Some(DeviceLink {
            generation,
            writer,
            reader,
        });

        self.retry.reset();
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start(
            self.settings.heartbeat_interval,
            generation,
            self.events_tx.clone(),
        );

        log::info!("[Device] Connected to {}", self.connector.peer());
    }

    /// Consumes one attempt and moves to `Retrying` or `Failed`.
    ///
    /// Returns true if another connect should be issued.
    fn register_failure(&mut self, error: &TransportError) -> bool {
        log::warn!("[Device] Transport error ({}): {}", error.code(), error);
        self.heartbeat.stop();
        self.teardown();

        if self.retry.consume() {
            self.set_state(ConnectionState::Retrying);
            log::info!(
                "[Device] Retrying... {}/{}",
                self.retry.attempts_used(),
                self.retry.max_attempts()
            );
            true
        } else {
            self.set_state(ConnectionState::Failed);
            log::error!(
                "[Device] Max retries reached ({}), waiting for manual reconnect",
                self.retry.max_attempts()
            );
            false
        }
    }

    /// Writes one frame, failing with `TimedOut` if the device stops reading.
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let timeout = self.settings.write_timeout;
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no device link"))?;

        let write = async {
            link.writer.write_all(frame).await?;
            link.writer.flush().await
        };
        tokio::time::timeout(timeout, write).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write stalled for {:?}", timeout),
            )
        })?
    }

    fn teardown(&mut self) {
        self.link = None;
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            log::debug!("[Device] State {} -> {}", self.state, state);
            self.state = state;
        }
        self.state_tx.send_replace(state);
    }
}

/// Splits the read half into frames and feeds them to the manager's event queue.
fn spawn_reader(
    generation: u64,
    reader: ReadHalf<BoxedDeviceIo>,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut frames = FramedRead::with_capacity(reader, FrameSplitter::new(), READ_BUFFER_SIZE);
        loop {
            let event = match frames.next().await {
                Some(Ok(bytes)) => LinkEvent::Data { generation, bytes },
                Some(Err(error)) => LinkEvent::Error { generation, error },
                None => LinkEvent::Closed { generation },
            };

            let last = !matches!(event, LinkEvent::Data { .. });
            if events.send(event).is_err() || last {
                break;
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the connection manager actor.
///
/// All methods enqueue and return immediately.
#[derive(Clone)]
pub struct DeviceHandle {
    requests: mpsc::UnboundedSender<DeviceRequest>,
    state: watch::Receiver<ConnectionState>,
}

impl DeviceHandle {
    /// Requests a connect (no-op if already connected).
    pub fn connect(&self) {
        self.request(DeviceRequest::Connect);
    }

    /// Queues a command for the device.
    pub fn send_command(&self, command: DeviceCommand) {
        self.request(DeviceRequest::Send(command));
    }

    /// Requests a full teardown and reconnect with a fresh retry budget.
    pub fn reconnect(&self) {
        self.request(DeviceRequest::Reconnect);
    }

    /// Returns the last published connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn request(&self, request: DeviceRequest) {
        if self.requests.send(request).is_err() {
            log::warn!("[Device] Connection manager stopped, dropping request");
        }
    }
}

/// Spawns the connection manager actor.
///
/// The actor starts disconnected; call [`DeviceHandle::connect`] to open the
/// connection. It stops when `cancel` fires or every handle is dropped.
pub fn spawn_connection_manager(
    connector: Arc<dyn DeviceConnector>,
    emitter: Arc<dyn StatusEmitter>,
    settings: ConnectionSettings,
    cancel: CancellationToken,
) -> (DeviceHandle, JoinHandle<()>) {
    let (manager, events) = ConnectionManager::new(connector, emitter, settings);
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let handle = DeviceHandle {
        requests: requests_tx,
        state: manager.subscribe_state(),
    };
    let task = tokio::spawn(manager.run(requests_rx, events, cancel));
    (handle, task)
}
