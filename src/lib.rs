// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # ble-tester
//!
//! A manual test harness for Bluetooth Low Energy devices: pick a device,
//! connect to it, list the characteristics of its first primary service,
//! list already-paired devices and run a quick advertisement scan.
//!
//! The library keeps exactly one *active* device. Its connection state
//! machine, the characteristics fetched for the current connection and the
//! failure indicator of each action are published as [`SessionSnapshot`]s
//! for a front end to render.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_tester::{BleTester, BtleplugAdapter, ChooserConfig, Result, TesterConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let adapter = BtleplugAdapter::new(ChooserConfig::default()).await?;
//!     let tester = BleTester::new(Arc::new(adapter), TesterConfig::default());
//!
//!     println!("{}", tester.availability().await);
//!
//!     // Hint the Heart Rate service so it is listed first.
//!     let device = tester.request_discovery("180d").await?;
//!     println!("Paired with {}", device);
//!
//!     tester.connect().await?;
//!     if let Some(Ok(characteristics)) = tester.wait_for_topology().await {
//!         for characteristic in characteristics {
//!             println!("  {}", characteristic);
//!         }
//!     }
//!
//!     tester.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

pub mod ble;
pub mod config;
pub mod discovery;
pub mod error;
pub mod session;
pub mod tester;

#[cfg(test)]
pub(crate) mod testing;

pub use ble::adapter::{Adapter, DeviceHandle};
pub use ble::connection::{ConnectedDevice, ConnectionController, ConnectionState};
pub use ble::platform::BtleplugAdapter;
pub use ble::scanner::ScanSession;
pub use ble::topology::{CharacteristicDescriptor, TopologySession};
pub use config::{ChooserConfig, TesterConfig};
pub use discovery::{DiscoveryCoordinator, PairedDevices, ServiceUuidFilter};
pub use error::{Error, Result};
pub use session::{DeviceSession, SessionSnapshot, Ticket};
pub use tester::{Availability, BleTester, CallbackHandle};
