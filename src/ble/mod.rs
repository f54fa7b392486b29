//! BLE communication module.
//!
//! The platform seam plus the components that drive it: connection state
//! machine, characteristic topology fetch and advertisement scans.

pub mod adapter;
pub mod connection;
pub mod platform;
pub mod scanner;
pub mod topology;
pub mod uuids;

pub use adapter::{
    Adapter, Device, DeviceHandle, GattServer, GattService, RequestDeviceOptions, ScanHandle,
    ScanOptions,
};
pub use connection::{ConnectedDevice, ConnectionController, ConnectionState};
pub use platform::BtleplugAdapter;
pub use scanner::ScanSession;
pub use topology::{CharacteristicDescriptor, TopologySession};
pub use uuids::*;
