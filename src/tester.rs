//! Presentation-facing facade.
//!
//! [`BleTester`] wires the discovery, connection, topology and scan
//! components to one [`DeviceSession`] and exposes the intents a front end
//! sends (pair, connect, disconnect, list paired devices, scan) plus the
//! stream of [`SessionSnapshot`]s it renders.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ble::adapter::{Adapter, DeviceHandle};
use crate::ble::connection::{ConnectionController, ConnectionState};
use crate::ble::scanner::ScanSession;
use crate::ble::topology::CharacteristicDescriptor;
use crate::config::TesterConfig;
use crate::discovery::{DiscoveryCoordinator, PairedDevices, ServiceUuidFilter};
use crate::error::{Error, Result};
use crate::session::{DeviceSession, SessionSnapshot};

type TopologyTask = JoinHandle<Result<Vec<CharacteristicDescriptor>>>;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Whether the host can do Bluetooth at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Availability {
    /// A radio is present and enabled.
    Available,
    /// No usable radio.
    Unsupported,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "This device supports Bluetooth!"),
            Self::Unsupported => write!(f, "Bluetooth is not supported"),
        }
    }
}

/// Single-device BLE test harness.
pub struct BleTester {
    adapter: Arc<dyn Adapter>,
    session: Arc<DeviceSession>,
    discovery: DiscoveryCoordinator,
    connection: ConnectionController,
    scanner: ScanSession,
    topology_task: Mutex<Option<TopologyTask>>,
    callback_counter: AtomicU64,
}

impl BleTester {
    /// Create a tester on top of `adapter`.
    pub fn new(adapter: Arc<dyn Adapter>, config: TesterConfig) -> Self {
        let session = Arc::new(DeviceSession::new(&config));

        Self {
            discovery: DiscoveryCoordinator::new(adapter.clone(), session.clone()),
            connection: ConnectionController::new(session.clone(), config),
            scanner: ScanSession::new(adapter.clone(), session.clone()),
            adapter,
            session,
            topology_task: Mutex::new(None),
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Check for a usable Bluetooth radio.
    ///
    /// A failing check is logged and reported as unsupported.
    pub async fn availability(&self) -> Availability {
        match self.adapter.is_available().await {
            Ok(true) => Availability::Available,
            Ok(false) => Availability::Unsupported,
            Err(e) => {
                warn!("Availability check failed: {}", e);
                Availability::Unsupported
            }
        }
    }

    /// Run the device chooser with the service filter typed by the user.
    ///
    /// Unparseable filter text counts as a failed pairing.
    pub async fn request_discovery(&self, filter: &str) -> Result<DeviceHandle> {
        let filter = match ServiceUuidFilter::parse(filter) {
            Ok(filter) => filter,
            Err(e) => {
                warn!("Rejecting service filter: {}", e);
                self.session.record_pair_failure(&e);
                return Err(Error::PairFailed {
                    source: Box::new(e),
                });
            }
        };

        self.discovery.request_device(&filter).await
    }

    /// Make a device from [`list_paired`](Self::list_paired) the active one.
    pub fn activate(&self, handle: DeviceHandle) {
        self.discovery.activate(handle);
    }

    /// Connect the active device and start fetching its characteristics.
    pub async fn connect(&self) -> Result<()> {
        let handle = self.session.active_device().ok_or(Error::NoActiveDevice)?;
        let connected = self.connection.connect(&handle).await?;

        debug!("Starting characteristic fetch for {}", connected.device);
        let task = tokio::spawn(connected.topology.fetch());
        *self.topology_task.lock() = Some(task);
        Ok(())
    }

    /// Disconnect the active device. Does nothing without one.
    pub fn disconnect(&self) {
        match self.session.active_device() {
            Some(handle) => self.connection.disconnect(&handle),
            None => debug!("Disconnect requested without an active device"),
        }
    }

    /// Wait for the most recently started characteristic fetch.
    ///
    /// Returns `None` if no fetch has been started since the last call.
    pub async fn wait_for_topology(&self) -> Option<Result<Vec<CharacteristicDescriptor>>> {
        let task = self.topology_task.lock().take()?;
        match task.await {
            Ok(result) => Some(result),
            Err(e) => Some(Err(Error::TopologyFetchFailed {
                source: Box::new(Error::platform(e.to_string())),
            })),
        }
    }

    /// Devices the host has already paired with.
    pub async fn list_paired(&self) -> Result<PairedDevices> {
        self.discovery.list_paired_devices().await
    }

    /// Start and immediately stop an advertisement scan.
    pub async fn scan_once(&self) -> Result<()> {
        self.scanner.scan_once().await
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Connection state of the active device.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// The active device, if any.
    pub fn active_device(&self) -> Option<DeviceHandle> {
        self.session.active_device()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    /// Register a callback for every state change.
    pub fn on_state_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(SessionSnapshot) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.session.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(snapshot) => callback(snapshot),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("State callback skipped {} snapshots", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// The shared session, for components built outside the tester.
    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }
}

impl Drop for BleTester {
    fn drop(&mut self) {
        if let Some(task) = self.topology_task.lock().take() {
            task.abort();
        }
        debug!("Tester dropped");
    }
}
