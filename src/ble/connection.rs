//! BLE connection management.
//!
//! Drives the connect/disconnect state machine of the active device:
//!
//! ```text
//! Unpaired           --connect--> Connecting --ok-->  Connected
//! Unpaired           --connect--> Connecting --err--> Unpaired
//! PairedDisconnected --connect--> Connecting --ok-->  Connected
//! PairedDisconnected --connect--> Connecting --err--> PairedDisconnected
//! Connected          --disconnect-->                  PairedDisconnected
//! Connecting         --disconnect-->                  state before the attempt
//! ```
//!
//! Disconnect is optimistic: the state flips immediately and the platform
//! teardown runs in the background.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ble::adapter::DeviceHandle;
use crate::ble::topology::TopologySession;
use crate::config::TesterConfig;
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Connection state of the active device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// The host holds no pairing for the device.
    #[default]
    Unpaired,
    /// Paired but no GATT connection is open.
    PairedDisconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the device.
    Connected,
    /// Currently disconnecting.
    ///
    /// Never held by [`ConnectionController`], whose disconnect completes
    /// immediately, but kept for adapters and front ends that model it.
    Disconnecting,
}

impl ConnectionState {
    /// State of a freshly installed device.
    pub fn initial(paired: bool) -> Self {
        if paired {
            Self::PairedDisconnected
        } else {
            Self::Unpaired
        }
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }

    /// Check if a connect attempt may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Unpaired | Self::PairedDisconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unpaired => write!(f, "Unpaired"),
            Self::PairedDisconnected => write!(f, "Paired"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Result of a successful [`ConnectionController::connect`].
#[derive(Debug)]
pub struct ConnectedDevice {
    /// The device that is now connected.
    pub device: DeviceHandle,
    /// Characteristic fetch for this connection, not yet started.
    pub topology: TopologySession,
}

/// Connects and disconnects the active device of a [`DeviceSession`].
///
/// Calls for one device are expected to be issued one at a time; a connect
/// while another is pending is rejected with [`Error::ConnectionInProgress`].
#[derive(Clone)]
pub struct ConnectionController {
    session: Arc<DeviceSession>,
    config: TesterConfig,
}

impl ConnectionController {
    /// Create a controller for the devices installed in `session`.
    pub fn new(session: Arc<DeviceSession>, config: TesterConfig) -> Self {
        Self { session, config }
    }

    /// Current connection state of the active device.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Check if the active device is connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Open a GATT connection to `handle`, which must be the active device.
    ///
    /// On failure the state returns to what it was before the attempt and
    /// the platform error is kept as the source of [`Error::ConnectFailed`].
    pub async fn connect(&self, handle: &DeviceHandle) -> Result<ConnectedDevice> {
        let (ticket, prior) = self.session.begin_connect(handle)?;
        info!("Connecting to {} (session {})", handle, ticket);

        match handle.device().connect().await {
            Ok(gatt) => {
                if !self.session.complete_connect(ticket, prior, Ok(())) {
                    debug!("Connection to {} superseded, releasing it", handle);
                    self.release(handle).await;
                    return Err(Error::Superseded);
                }

                info!("Connected to {}", handle);
                Ok(ConnectedDevice {
                    device: handle.clone(),
                    topology: TopologySession::new(
                        gatt,
                        self.session.clone(),
                        ticket,
                        self.config.topology_timeout,
                    ),
                })
            }
            Err(e) => {
                if !self.session.complete_connect(ticket, prior, Err(&e)) {
                    debug!("Ignoring stale connect failure for {}: {}", handle, e);
                    return Err(Error::Superseded);
                }

                warn!("Failed to connect to {}: {}", handle, e);
                Err(Error::ConnectFailed {
                    source: Box::new(e),
                })
            }
        }
    }

    /// Disconnect `handle`.
    ///
    /// The session is updated before this returns; the platform teardown is
    /// spawned and its failure is only logged. Must be called from within a
    /// tokio runtime.
    pub fn disconnect(&self, handle: &DeviceHandle) {
        if self.session.disconnect(handle) {
            info!("Disconnected from {}", handle);
        } else {
            debug!("Disconnect requested for inactive device {}", handle);
        }

        let device = handle.device().clone();
        let name = handle.display_name();
        tokio::spawn(async move {
            if let Err(e) = device.disconnect().await {
                warn!("Platform disconnect of {} failed: {}", name, e);
            }
        });
    }

    async fn release(&self, handle: &DeviceHandle) {
        if let Err(e) = handle.device().disconnect().await {
            warn!("Failed to release superseded connection to {}: {}", handle, e);
        }
    }
}
