//! Bridge bootstrap and dependency wiring.
//!
//! This module is the composition root: the one place where the codec,
//! connection manager, router and OSC sockets are created and wired
//! together. Startup order:
//!
//! 1. Validate configuration
//! 2. Outbound OSC sender (resolves the remote target)
//! 3. Router (depends on the sender)
//! 4. Inbound OSC socket
//! 5. Connection manager actor (depends on the router as its status emitter)
//!
//! [`BootstrappedBridge::start`] then opens the listener and requests the
//! first connect.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::control::{
    resolve_target, run_control_listener, ControlRouter, ControlSender, DeviceControl,
    UdpControlSender,
};
use crate::device::{
    spawn_connection_manager, ConnectionSettings, ConnectionState, DeviceConnector, DeviceHandle,
    StatusEmitter, TcpConnector,
};
use crate::error::{BridgeError, BridgeResult};

/// Container for the wired bridge.
pub struct BootstrappedBridge {
    /// Effective configuration.
    pub config: Config,
    /// Handle to the device connection manager.
    pub device: DeviceHandle,
    /// Translates between OSC and device messages.
    pub router: Arc<ControlRouter>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    listener: Mutex<Option<UdpSocket>>,
    listen_addr: SocketAddr,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BootstrappedBridge {
    /// Starts listening for OSC and requests the first device connect.
    ///
    /// Calling it again is a no-op.
    pub fn start(&self) {
        let Some(socket) = self.listener.lock().take() else {
            log::debug!("[Bridge] Already started");
            return;
        };

        let listener = tokio::spawn(run_control_listener(
            socket,
            Arc::clone(&self.router),
            Arc::new(self.device.clone()) as Arc<dyn DeviceControl>,
            self.cancel_token.clone(),
        ));
        self.tasks.lock().push(listener);

        log::info!(
            "[Bridge] Connecting to TCP {}",
            self.config.device_addr()
        );
        self.device.connect();
    }

    /// Local address of the inbound OSC socket.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Current device connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.device.state()
    }

    /// Stops the heartbeat, closes the device connection and releases both
    /// OSC sockets. Safe to call more than once.
    pub async fn shutdown(&self) {
        log::info!("[Bridge] Beginning graceful shutdown...");

        self.cancel_token.cancel();
        self.router.close();
        // Never started: release the inbound port too.
        self.listener.lock().take();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("[Bridge] Task ended abnormally: {}", e);
            }
        }

        log::info!("[Bridge] Shutdown complete");
    }
}

/// Bootstraps the bridge with a TCP connection to the configured device.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the OSC remote cannot
/// be resolved or either OSC socket cannot be bound.
pub async fn bootstrap_bridge(config: &Config) -> BridgeResult<BootstrappedBridge> {
    let connector = Arc::new(TcpConnector::new(
        config.device_host.clone(),
        config.device_port,
    ));
    bootstrap_bridge_with_connector(config, connector).await
}

/// Bootstraps the bridge with an explicit device connector.
pub async fn bootstrap_bridge_with_connector(
    config: &Config,
    connector: Arc<dyn DeviceConnector>,
) -> BridgeResult<BootstrappedBridge> {
    config.validate()?;

    let target = resolve_target(&config.control_remote_host, config.control_remote_port)
        .await
        .map_err(|e| {
            BridgeError::Network(format!(
                "Failed to resolve OSC target {}:{}: {}",
                config.control_remote_host, config.control_remote_port, e
            ))
        })?;
    let sender = UdpControlSender::bind(target)
        .await
        .map_err(|e| BridgeError::Network(format!("Failed to bind OSC sender: {}", e)))?;
    log::info!("[Bridge] Sending OSC status to {}", target);

    let router = Arc::new(ControlRouter::new(
        Arc::new(sender) as Arc<dyn ControlSender>,
        &config.address_prefix,
    ));

    let listener = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.control_listen_port))
        .await
        .map_err(|e| {
            BridgeError::Network(format!(
                "Failed to bind OSC listener on port {}: {}",
                config.control_listen_port, e
            ))
        })?;
    let listen_addr = listener
        .local_addr()
        .map_err(|e| BridgeError::Network(format!("OSC listener has no address: {}", e)))?;

    let cancel_token = CancellationToken::new();
    let (device, device_task) = spawn_connection_manager(
        connector,
        Arc::clone(&router) as Arc<dyn StatusEmitter>,
        ConnectionSettings::from(config),
        cancel_token.clone(),
    );

    Ok(BootstrappedBridge {
        config: config.clone(),
        device,
        router,
        cancel_token,
        listener: Mutex::new(Some(listener)),
        listen_addr,
        tasks: Mutex::new(vec![device_task]),
    })
}
