//! Platform capability seam.
//!
//! The core never talks to a radio directly. Everything it needs from the
//! host (availability, the device chooser, paired devices, GATT connections
//! and advertisement scans) goes through the traits in this module.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::ble::topology::CharacteristicDescriptor;
use crate::error::Result;

/// Options passed to the platform device chooser.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestDeviceOptions {
    /// Offer every nearby device regardless of what it advertises.
    pub accept_all_devices: bool,
    /// Services the caller wants access to once connected.
    ///
    /// `None` when no service hint was given.
    pub optional_services: Option<Vec<Uuid>>,
}

/// Options for a passive advertisement scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOptions {
    /// Report every advertisement instead of filtering.
    pub accept_all_advertisements: bool,
}

/// The host Bluetooth capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Whether the host has a usable Bluetooth radio.
    async fn is_available(&self) -> Result<bool>;

    /// Let the user pick a device.
    async fn request_device(&self, options: RequestDeviceOptions) -> Result<Arc<dyn Device>>;

    /// Devices the host has already paired with.
    async fn paired_devices(&self) -> Result<Vec<Arc<dyn Device>>>;

    /// Start a passive advertisement scan.
    async fn request_scan(&self, options: ScanOptions) -> Result<Box<dyn ScanHandle>>;
}

/// One device as seen by the platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Device: Send + Sync {
    /// Stable platform identifier.
    fn id(&self) -> String;

    /// Advertised or cached display name.
    fn name(&self) -> Option<String>;

    /// Whether the host already holds a pairing for this device.
    fn is_paired(&self) -> bool;

    /// Open a GATT connection, pairing first if the platform requires it.
    async fn connect(&self) -> Result<Arc<dyn GattServer>>;

    /// Tear down the GATT connection.
    async fn disconnect(&self) -> Result<()>;
}

/// A connected GATT server.
#[async_trait]
pub trait GattServer: Send + Sync {
    /// Primary services in the order the platform reports them.
    async fn primary_services(&self) -> Result<Vec<Arc<dyn GattService>>>;
}

/// A primary service on a connected device.
#[async_trait]
pub trait GattService: Send + Sync {
    /// Service UUID.
    fn uuid(&self) -> Uuid;

    /// Characteristics exposed by this service.
    async fn characteristics(&self) -> Result<Vec<CharacteristicDescriptor>>;
}

/// A running advertisement scan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanHandle: Send + Sync {
    /// Stop the scan.
    async fn stop(&self) -> Result<()>;
}

/// Reference to a discovered or paired device.
///
/// Cloning is cheap; clones refer to the same platform device.
#[derive(Clone)]
pub struct DeviceHandle {
    device: Arc<dyn Device>,
}

impl DeviceHandle {
    /// Wrap a platform device.
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device }
    }

    /// Platform identifier.
    pub fn id(&self) -> String {
        self.device.id()
    }

    /// Display name, if the device has one.
    pub fn name(&self) -> Option<String> {
        self.device.name()
    }

    /// Name for display, falling back to the identifier.
    pub fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| self.id())
    }

    /// Whether the host already holds a pairing for this device.
    pub fn is_paired(&self) -> bool {
        self.device.is_paired()
    }

    /// The platform device.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Whether both handles refer to the same platform device object.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        Arc::as_ptr(&self.device) as *const () == Arc::as_ptr(&other.device) as *const ()
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("paired", &self.is_paired())
            .finish()
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
