//! Device discovery.
//!
//! Runs the platform chooser, optionally hinting a service the user wants to
//! inspect, and installs the chosen device as the active one. Also lists the
//! devices the host has already paired with.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::adapter::{Adapter, DeviceHandle, RequestDeviceOptions};
use crate::ble::uuids::parse_service_uuid;
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Optional service the user wants access to after connecting.
///
/// The filter is only a hint: every device type is offered by the chooser
/// whether or not a filter is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceUuidFilter(Option<Uuid>);

impl ServiceUuidFilter {
    /// No service hint.
    pub fn none() -> Self {
        Self(None)
    }

    /// Hint a specific service.
    pub fn service(uuid: Uuid) -> Self {
        Self(Some(uuid))
    }

    /// Parse user input. Blank input means no filter.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::none());
        }
        parse_service_uuid(text).map(Self::service)
    }

    /// The hinted service.
    pub fn uuid(&self) -> Option<Uuid> {
        self.0
    }

    /// Chooser options for this filter.
    pub fn request_options(&self) -> RequestDeviceOptions {
        RequestDeviceOptions {
            accept_all_devices: true,
            optional_services: self.0.map(|uuid| vec![uuid]),
        }
    }
}

impl From<Option<Uuid>> for ServiceUuidFilter {
    fn from(uuid: Option<Uuid>) -> Self {
        Self(uuid)
    }
}

/// Result of listing paired devices.
#[derive(Debug, Clone)]
pub enum PairedDevices {
    /// The host has no paired devices.
    Empty,
    /// At least one paired device.
    Devices(Vec<DeviceHandle>),
}

impl PairedDevices {
    fn from_handles(handles: Vec<DeviceHandle>) -> Self {
        if handles.is_empty() {
            Self::Empty
        } else {
            Self::Devices(handles)
        }
    }

    /// Check if no devices were found.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The devices found.
    pub fn devices(&self) -> &[DeviceHandle] {
        match self {
            Self::Empty => &[],
            Self::Devices(devices) => devices.as_slice(),
        }
    }

    /// Number of devices found.
    pub fn len(&self) -> usize {
        self.devices().len()
    }
}

impl fmt::Display for PairedDevices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "No devices found!"),
            Self::Devices(devices) => {
                let names: Vec<_> = devices.iter().map(DeviceHandle::display_name).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

/// Runs the device chooser and owns installation of the active device.
pub struct DiscoveryCoordinator {
    adapter: Arc<dyn Adapter>,
    session: Arc<DeviceSession>,
}

impl DiscoveryCoordinator {
    /// Create a coordinator installing devices into `session`.
    pub fn new(adapter: Arc<dyn Adapter>, session: Arc<DeviceSession>) -> Self {
        Self { adapter, session }
    }

    /// Ask the user to pick a device and make it the active one.
    ///
    /// On failure the active device is left as it was and the pairing
    /// failure indicator is raised.
    pub async fn request_device(&self, filter: &ServiceUuidFilter) -> Result<DeviceHandle> {
        let options = filter.request_options();
        info!(
            "Requesting device (optional services: {:?})",
            options.optional_services
        );

        match self.adapter.request_device(options).await {
            Ok(device) => {
                let handle = DeviceHandle::new(device);
                info!("Name: {}", handle.display_name());
                self.install(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!("Failed to pair: {}", e);
                self.session.record_pair_failure(&e);
                Err(Error::PairFailed {
                    source: Box::new(e),
                })
            }
        }
    }

    /// Devices the host has already paired with. Does not change any state.
    pub async fn list_paired_devices(&self) -> Result<PairedDevices> {
        let devices = self.adapter.paired_devices().await.map_err(|e| {
            warn!("Failed to list paired devices: {}", e);
            e
        })?;

        let paired = PairedDevices::from_handles(devices.into_iter().map(DeviceHandle::new).collect());
        debug!("Found {} paired devices", paired.len());
        Ok(paired)
    }

    /// Make a previously listed device the active one.
    pub fn activate(&self, handle: DeviceHandle) {
        info!("Activating paired device {}", handle);
        self.install(handle);
    }

    fn install(&self, handle: DeviceHandle) {
        let epoch = self.session.install(handle);
        debug!("Active device replaced, epoch {}", epoch);
    }
}
