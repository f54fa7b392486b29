//! btleplug-backed [`Adapter`].
//!
//! btleplug has no system device chooser, so [`BtleplugAdapter`] emulates one:
//! it scans for the configured window with an empty filter (every device
//! type) and picks the peripheral with the strongest signal. Peripherals the
//! host already knows about are reported as paired.

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter as PlatformAdapter, Manager, Peripheral};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::adapter::{
    Adapter, Device, GattServer, GattService, RequestDeviceOptions, ScanHandle, ScanOptions,
};
use crate::ble::topology::CharacteristicDescriptor;
use crate::config::ChooserConfig;
use crate::error::{Error, Result};

/// Host Bluetooth adapter driven through btleplug.
pub struct BtleplugAdapter {
    adapter: PlatformAdapter,
    config: ChooserConfig,
}

impl BtleplugAdapter {
    /// Use the first Bluetooth adapter of the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothUnavailable`] if the host has none.
    pub async fn new(config: ChooserConfig) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter, config))
    }

    /// Wrap a specific btleplug adapter.
    pub fn with_adapter(adapter: PlatformAdapter, config: ChooserConfig) -> Self {
        Self { adapter, config }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &PlatformAdapter {
        &self.adapter
    }

    async fn strongest_peripheral(&self) -> Result<Option<(Peripheral, PeripheralProperties)>> {
        let mut best: Option<(Peripheral, PeripheralProperties)> = None;

        for peripheral in self.adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(properties)) => properties,
                _ => continue,
            };
            trace!(
                "Chooser candidate {} {:?} rssi {:?}",
                peripheral.id(),
                properties.local_name,
                properties.rssi
            );

            let rssi = properties.rssi.unwrap_or(i16::MIN);
            let stronger = best
                .as_ref()
                .map(|(_, current)| rssi > current.rssi.unwrap_or(i16::MIN))
                .unwrap_or(true);
            if stronger {
                best = Some((peripheral, properties));
            }
        }

        Ok(best)
    }
}

#[async_trait]
impl Adapter for BtleplugAdapter {
    async fn is_available(&self) -> Result<bool> {
        Ok(self.adapter.adapter_info().await.is_ok())
    }

    async fn request_device(&self, options: RequestDeviceOptions) -> Result<Arc<dyn Device>> {
        if !options.accept_all_devices {
            debug!("Chooser always offers every device type");
        }

        info!(
            "Scanning {:?} for devices to choose from",
            self.config.scan_window
        );
        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.config.scan_window).await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop chooser scan: {}", e);
        }

        let (peripheral, properties) = self
            .strongest_peripheral()
            .await?
            .ok_or(Error::NoDeviceSelected)?;

        info!(
            "Chose {} ({:?}, rssi {:?})",
            peripheral.id(),
            properties.local_name,
            properties.rssi
        );

        Ok(Arc::new(BtleplugDevice {
            peripheral,
            name: properties.local_name,
            paired: true,
            optional_services: options.optional_services.unwrap_or_default(),
        }))
    }

    async fn paired_devices(&self) -> Result<Vec<Arc<dyn Device>>> {
        let mut devices: Vec<Arc<dyn Device>> = Vec::new();

        for peripheral in self.adapter.peripherals().await? {
            let name = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|properties| properties.local_name);

            devices.push(Arc::new(BtleplugDevice {
                peripheral,
                name,
                paired: true,
                optional_services: Vec::new(),
            }));
        }

        Ok(devices)
    }

    async fn request_scan(&self, options: ScanOptions) -> Result<Box<dyn ScanHandle>> {
        debug!(
            "Starting scan (accept all advertisements: {})",
            options.accept_all_advertisements
        );
        self.adapter.start_scan(ScanFilter::default()).await?;

        Ok(Box::new(BtleplugScan {
            adapter: self.adapter.clone(),
        }))
    }
}

/// A peripheral known to the btleplug adapter.
pub struct BtleplugDevice {
    peripheral: Peripheral,
    name: Option<String>,
    paired: bool,
    optional_services: Vec<Uuid>,
}

#[async_trait]
impl Device for BtleplugDevice {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn is_paired(&self) -> bool {
        self.paired
    }

    async fn connect(&self) -> Result<Arc<dyn GattServer>> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral.connect().await?;
        }
        self.peripheral.discover_services().await?;

        Ok(Arc::new(BtleplugGatt {
            peripheral: self.peripheral.clone(),
            preferred: self.optional_services.clone(),
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

struct BtleplugGatt {
    peripheral: Peripheral,
    preferred: Vec<Uuid>,
}

#[async_trait]
impl GattServer for BtleplugGatt {
    async fn primary_services(&self) -> Result<Vec<Arc<dyn GattService>>> {
        let mut services: Vec<_> = self
            .peripheral
            .services()
            .into_iter()
            .filter(|service| service.primary)
            .collect();

        // Requested services first, everything else in platform order.
        services.sort_by_key(|service| {
            self.preferred
                .iter()
                .position(|uuid| *uuid == service.uuid)
                .unwrap_or(usize::MAX)
        });

        Ok(services
            .into_iter()
            .map(|service| Arc::new(BtleplugService { service }) as Arc<dyn GattService>)
            .collect())
    }
}

struct BtleplugService {
    service: btleplug::api::Service,
}

#[async_trait]
impl GattService for BtleplugService {
    fn uuid(&self) -> Uuid {
        self.service.uuid
    }

    async fn characteristics(&self) -> Result<Vec<CharacteristicDescriptor>> {
        Ok(self
            .service
            .characteristics
            .iter()
            .map(|characteristic| CharacteristicDescriptor::new(characteristic.uuid))
            .collect())
    }
}

struct BtleplugScan {
    adapter: PlatformAdapter,
}

#[async_trait]
impl ScanHandle for BtleplugScan {
    async fn stop(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_types_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BtleplugAdapter>();
        assert_send_sync::<BtleplugDevice>();
    }
}
