//! The active device slot.
//!
//! A [`DeviceSession`] holds the one device the tester is working with, its
//! connection state, the characteristics fetched for the current connection
//! and the inline failure indicators shown next to each action. Every change
//! is published as a [`SessionSnapshot`].
//!
//! Asynchronous completions carry a [`Ticket`] captured when they started.
//! The epoch moves on every device installation and the generation on every
//! connect attempt or disconnect, so a completion whose ticket no longer
//! matches is dropped instead of overwriting newer state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

use crate::ble::adapter::DeviceHandle;
use crate::ble::connection::ConnectionState;
use crate::ble::topology::CharacteristicDescriptor;
use crate::config::TesterConfig;
use crate::error::{Error, Result};

/// Identifies the connection an asynchronous operation was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    /// Device installation counter.
    pub epoch: u64,
    /// Connection attempt counter within the epoch.
    pub generation: u64,
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch, self.generation)
    }
}

/// Observable state of the tester.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    /// Device installation counter.
    pub epoch: u64,
    /// Connection state of the active device.
    pub connection_state: ConnectionState,
    /// Platform identifier of the active device.
    pub device_id: Option<String>,
    /// Display name of the active device.
    pub device_name: Option<String>,
    /// Characteristics of the current connection.
    pub characteristics: Vec<CharacteristicDescriptor>,
    /// Last pairing failure, cleared by the next successful pairing.
    pub pair_error: Option<String>,
    /// Last connection failure, cleared by the next successful connection.
    pub connect_error: Option<String>,
    /// Last characteristic fetch failure.
    pub topology_error: Option<String>,
    /// Last scan failure, cleared by the next successful scan.
    pub scan_error: Option<String>,
    /// When this state was produced.
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Whether a device is installed.
    pub fn has_device(&self) -> bool {
        self.device_id.is_some()
    }

    /// Whether the last pairing attempt failed.
    pub fn pair_failed(&self) -> bool {
        self.pair_error.is_some()
    }

    /// Whether the last connection attempt failed.
    pub fn connect_failed(&self) -> bool {
        self.connect_error.is_some()
    }
}

struct SessionInner {
    epoch: u64,
    generation: u64,
    device: Option<DeviceHandle>,
    state: ConnectionState,
    /// State a pending connect attempt started from.
    connect_fallback: ConnectionState,
    characteristics: Vec<CharacteristicDescriptor>,
    pair_error: Option<String>,
    connect_error: Option<String>,
    topology_error: Option<String>,
    scan_error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl SessionInner {
    fn ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            generation: self.generation,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            epoch: self.epoch,
            connection_state: self.state,
            device_id: self.device.as_ref().map(DeviceHandle::id),
            device_name: self.device.as_ref().and_then(DeviceHandle::name),
            characteristics: self.characteristics.clone(),
            pair_error: self.pair_error.clone(),
            connect_error: self.connect_error.clone(),
            topology_error: self.topology_error.clone(),
            scan_error: self.scan_error.clone(),
            updated_at: self.updated_at,
        }
    }

    fn is_active(&self, handle: &DeviceHandle) -> bool {
        self.device
            .as_ref()
            .map(|active| active.same_device(handle))
            .unwrap_or(false)
    }
}

/// Shared slot for the active device.
pub struct DeviceSession {
    inner: RwLock<SessionInner>,
    event_tx: broadcast::Sender<SessionSnapshot>,
}

impl DeviceSession {
    /// Create an empty session.
    pub fn new(config: &TesterConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: RwLock::new(SessionInner {
                epoch: 0,
                generation: 0,
                device: None,
                state: ConnectionState::Unpaired,
                connect_fallback: ConnectionState::Unpaired,
                characteristics: Vec::new(),
                pair_error: None,
                connect_error: None,
                topology_error: None,
                scan_error: None,
                updated_at: Utc::now(),
            }),
            event_tx,
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().snapshot()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.event_tx.subscribe()
    }

    /// The active device, if any.
    pub fn active_device(&self) -> Option<DeviceHandle> {
        self.inner.read().device.clone()
    }

    /// Connection state of the active device.
    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    /// Device installation counter.
    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Whether `ticket` still names the current connection.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.inner.read().ticket() == ticket
    }

    /// Make `handle` the active device, resetting the state machine.
    pub(crate) fn install(&self, handle: DeviceHandle) -> u64 {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.generation = 0;
        inner.state = ConnectionState::initial(handle.is_paired());
        inner.connect_fallback = inner.state;
        inner.device = Some(handle);
        inner.characteristics.clear();
        inner.pair_error = None;
        inner.connect_error = None;
        inner.topology_error = None;
        debug!(
            "Installed device epoch {} in state {}",
            inner.epoch, inner.state
        );
        self.publish(&mut inner);
        inner.epoch
    }

    pub(crate) fn record_pair_failure(&self, error: &Error) {
        let mut inner = self.inner.write();
        inner.pair_error = Some(error.to_string());
        self.publish(&mut inner);
    }

    /// Move the active device into `Connecting`.
    ///
    /// Returns the attempt's ticket and the state to fall back to on failure.
    pub(crate) fn begin_connect(&self, handle: &DeviceHandle) -> Result<(Ticket, ConnectionState)> {
        let mut inner = self.inner.write();

        if inner.device.is_none() {
            return Err(Error::NoActiveDevice);
        }
        if !inner.is_active(handle) {
            return Err(Error::InactiveDevice {
                identifier: handle.id(),
            });
        }

        let prior = inner.state;
        match prior {
            ConnectionState::Connected => return Err(Error::AlreadyConnected),
            ConnectionState::Connecting | ConnectionState::Disconnecting => {
                return Err(Error::ConnectionInProgress)
            }
            ConnectionState::Unpaired | ConnectionState::PairedDisconnected => {}
        }

        inner.generation += 1;
        inner.state = ConnectionState::Connecting;
        inner.connect_fallback = prior;
        let ticket = inner.ticket();
        self.publish(&mut inner);
        Ok((ticket, prior))
    }

    /// Apply the outcome of a connect attempt.
    ///
    /// Returns `false` without touching anything when the ticket is stale.
    pub(crate) fn complete_connect(
        &self,
        ticket: Ticket,
        prior: ConnectionState,
        outcome: std::result::Result<(), &Error>,
    ) -> bool {
        let mut inner = self.inner.write();
        if inner.ticket() != ticket {
            return false;
        }

        match outcome {
            Ok(()) => {
                inner.state = ConnectionState::Connected;
                inner.connect_error = None;
                inner.topology_error = None;
                inner.characteristics.clear();
            }
            Err(e) => {
                inner.state = prior;
                inner.connect_error = Some(e.to_string());
            }
        }
        self.publish(&mut inner);
        true
    }

    /// Optimistically mark the active device as disconnected.
    ///
    /// A pending connect attempt is abandoned and the state goes back to
    /// the one the attempt started from. Returns `false` when `handle` is
    /// not the active device.
    pub(crate) fn disconnect(&self, handle: &DeviceHandle) -> bool {
        let mut inner = self.inner.write();
        if !inner.is_active(handle) {
            return false;
        }

        inner.generation += 1;
        match inner.state {
            ConnectionState::Connected => inner.state = ConnectionState::PairedDisconnected,
            ConnectionState::Connecting => inner.state = inner.connect_fallback,
            _ => {}
        }
        inner.characteristics.clear();
        self.publish(&mut inner);
        true
    }

    /// Apply the outcome of a characteristic fetch.
    ///
    /// Returns `false` without touching anything when the ticket is stale.
    pub(crate) fn apply_topology(
        &self,
        ticket: Ticket,
        outcome: std::result::Result<&[CharacteristicDescriptor], &Error>,
    ) -> bool {
        let mut inner = self.inner.write();
        if inner.ticket() != ticket || inner.state != ConnectionState::Connected {
            return false;
        }

        match outcome {
            Ok(characteristics) => {
                inner.characteristics = characteristics.to_vec();
                inner.topology_error = None;
            }
            Err(e) => {
                inner.characteristics.clear();
                inner.topology_error = Some(e.to_string());
            }
        }
        self.publish(&mut inner);
        true
    }

    pub(crate) fn record_scan(&self, outcome: std::result::Result<(), &Error>) {
        let mut inner = self.inner.write();
        inner.scan_error = outcome.err().map(|e| e.to_string());
        self.publish(&mut inner);
    }

    fn publish(&self, inner: &mut SessionInner) {
        inner.updated_at = Utc::now();
        // No subscribers is fine.
        let _ = self.event_tx.send(inner.snapshot());
    }
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new(&TesterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use std::sync::Arc;

    fn handle(device: FakeDevice) -> DeviceHandle {
        DeviceHandle::new(Arc::new(device))
    }

    #[test]
    fn test_empty_session() {
        let session = DeviceSession::default();
        let snapshot = session.snapshot();

        assert_eq!(snapshot.epoch, 0);
        assert!(!snapshot.has_device());
        assert_eq!(snapshot.connection_state, ConnectionState::Unpaired);
    }

    #[test]
    fn test_install_derives_initial_state() {
        let session = DeviceSession::default();

        session.install(handle(FakeDevice::new("a")));
        assert_eq!(session.state(), ConnectionState::Unpaired);

        session.install(handle(FakeDevice::new("b").paired()));
        assert_eq!(session.state(), ConnectionState::PairedDisconnected);
        assert_eq!(session.epoch(), 2);
    }

    #[test]
    fn test_install_publishes_snapshot() {
        let session = DeviceSession::default();
        let mut rx = session.subscribe();

        session.install(handle(FakeDevice::new("a").named("Thingy")));

        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.device_name.as_deref(), Some("Thingy"));
        assert_eq!(snapshot.device_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_begin_connect_without_device() {
        let session = DeviceSession::default();
        let err = session
            .begin_connect(&handle(FakeDevice::new("a")))
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveDevice));
    }

    #[test]
    fn test_begin_connect_rejects_other_handle() {
        let session = DeviceSession::default();
        session.install(handle(FakeDevice::new("a")));

        let err = session
            .begin_connect(&handle(FakeDevice::new("b")))
            .unwrap_err();
        assert!(matches!(err, Error::InactiveDevice { identifier } if identifier == "b"));
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let session = DeviceSession::default();
        let first = handle(FakeDevice::new("a"));
        session.install(first.clone());
        let (ticket, prior) = session.begin_connect(&first).unwrap();

        session.install(handle(FakeDevice::new("b").paired()));

        assert!(!session.is_current(ticket));
        assert!(!session.complete_connect(ticket, prior, Ok(())));
        assert_eq!(session.state(), ConnectionState::PairedDisconnected);
    }

    #[test]
    fn test_pair_failure_cleared_by_install() {
        let session = DeviceSession::default();
        session.record_pair_failure(&Error::NoDeviceSelected);
        assert!(session.snapshot().pair_failed());

        session.install(handle(FakeDevice::new("a")));
        assert!(!session.snapshot().pair_failed());
    }

    #[test]
    fn test_scan_failure_cleared_by_success() {
        let session = DeviceSession::default();
        session.record_scan(Err(&Error::platform("adapter busy")));
        assert_eq!(
            session.snapshot().scan_error.as_deref(),
            Some("Platform error: adapter busy")
        );

        session.record_scan(Ok(()));
        assert!(session.snapshot().scan_error.is_none());
    }
}
