//! In-memory adapter for tests.
//!
//! Unlike the `mockall` mocks, these fakes can hold an operation open on a
//! [`Notify`] gate so tests control the order in which completions land.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::ble::adapter::{
    Adapter, Device, GattServer, GattService, RequestDeviceOptions, ScanHandle, ScanOptions,
};
use crate::ble::topology::CharacteristicDescriptor;
use crate::error::{Error, Result};

#[derive(Default)]
pub(crate) struct FakeAdapter {
    unavailable: bool,
    chooser: Mutex<VecDeque<std::result::Result<Arc<FakeDevice>, String>>>,
    paired: Vec<Arc<FakeDevice>>,
    scan_error: Option<String>,
    scan_hangs: bool,
    requests: Mutex<Vec<RequestDeviceOptions>>,
    scan_starts: AtomicUsize,
    scan_stops: Arc<AtomicUsize>,
}

impl FakeAdapter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Queue a device for the next chooser request.
    pub(crate) fn choosing(self, device: FakeDevice) -> Self {
        self.choosing_shared(Arc::new(device))
    }

    pub(crate) fn choosing_shared(self, device: Arc<FakeDevice>) -> Self {
        self.chooser.lock().push_back(Ok(device));
        self
    }

    /// Queue a chooser failure.
    pub(crate) fn rejecting(self, message: &str) -> Self {
        self.chooser.lock().push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn with_paired(mut self, device: FakeDevice) -> Self {
        self.paired.push(Arc::new(device));
        self
    }

    pub(crate) fn failing_scan(mut self, message: &str) -> Self {
        self.scan_error = Some(message.to_string());
        self
    }

    pub(crate) fn hanging_scan(mut self) -> Self {
        self.scan_hangs = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<RequestDeviceOptions> {
        self.requests.lock().clone()
    }

    pub(crate) fn scan_starts(&self) -> usize {
        self.scan_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn scan_stops(&self) -> usize {
        self.scan_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    async fn is_available(&self) -> Result<bool> {
        Ok(!self.unavailable)
    }

    async fn request_device(&self, options: RequestDeviceOptions) -> Result<Arc<dyn Device>> {
        self.requests.lock().push(options);
        let next = self.chooser.lock().pop_front();
        match next {
            Some(Ok(device)) => Ok(device),
            Some(Err(message)) => Err(Error::platform(message)),
            None => Err(Error::NoDeviceSelected),
        }
    }

    async fn paired_devices(&self) -> Result<Vec<Arc<dyn Device>>> {
        Ok(self
            .paired
            .iter()
            .map(|device| device.clone() as Arc<dyn Device>)
            .collect())
    }

    async fn request_scan(&self, _options: ScanOptions) -> Result<Box<dyn ScanHandle>> {
        self.scan_starts.fetch_add(1, Ordering::SeqCst);
        if self.scan_hangs {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.scan_error {
            return Err(Error::platform(message.clone()));
        }
        Ok(Box::new(FakeScan {
            stops: self.scan_stops.clone(),
        }))
    }
}

struct FakeScan {
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl ScanHandle for FakeScan {
    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeDevice {
    id: String,
    name: Option<String>,
    paired: bool,
    connect_outcomes: Mutex<VecDeque<std::result::Result<(), String>>>,
    connect_gate: Option<Arc<Notify>>,
    services: Vec<(Uuid, Vec<Uuid>)>,
    services_gate: Option<Arc<Notify>>,
    services_error: Option<String>,
    disconnect_error: Option<String>,
    disconnect_hangs: bool,
    pub(crate) connect_calls: AtomicUsize,
    pub(crate) disconnect_calls: AtomicUsize,
}

impl FakeDevice {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            paired: false,
            connect_outcomes: Mutex::new(VecDeque::new()),
            connect_gate: None,
            services: Vec::new(),
            services_gate: None,
            services_error: None,
            disconnect_error: None,
            disconnect_hangs: false,
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub(crate) fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// Fail the next connect attempt; later attempts succeed.
    pub(crate) fn failing_connect(self, message: &str) -> Self {
        self.connect_outcomes
            .lock()
            .push_back(Err(message.to_string()));
        self
    }

    /// Replace any queued connect outcomes with a single one.
    pub(crate) fn set_next_connect(&self, succeeds: bool) {
        let mut outcomes = self.connect_outcomes.lock();
        outcomes.clear();
        outcomes.push_back(if succeeds {
            Ok(())
        } else {
            Err("connection refused".to_string())
        });
    }

    pub(crate) fn gated_connect(mut self, gate: Arc<Notify>) -> Self {
        self.connect_gate = Some(gate);
        self
    }

    pub(crate) fn with_service(mut self, uuid: Uuid, characteristics: &[Uuid]) -> Self {
        self.services.push((uuid, characteristics.to_vec()));
        self
    }

    pub(crate) fn gated_services(mut self, gate: Arc<Notify>) -> Self {
        self.services_gate = Some(gate);
        self
    }

    pub(crate) fn failing_services(mut self, message: &str) -> Self {
        self.services_error = Some(message.to_string());
        self
    }

    pub(crate) fn failing_disconnect(mut self, message: &str) -> Self {
        self.disconnect_error = Some(message.to_string());
        self
    }

    pub(crate) fn hanging_disconnect(mut self) -> Self {
        self.disconnect_hangs = true;
        self
    }
}

#[async_trait]
impl Device for FakeDevice {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn is_paired(&self) -> bool {
        self.paired
    }

    async fn connect(&self) -> Result<Arc<dyn GattServer>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }

        let outcome = self.connect_outcomes.lock().pop_front().unwrap_or(Ok(()));
        outcome.map_err(Error::platform)?;

        Ok(Arc::new(FakeGatt {
            services: self.services.clone(),
            gate: self.services_gate.clone(),
            error: self.services_error.clone(),
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.disconnect_hangs {
            std::future::pending::<()>().await;
        }
        match &self.disconnect_error {
            Some(message) => Err(Error::platform(message.clone())),
            None => Ok(()),
        }
    }
}

struct FakeGatt {
    services: Vec<(Uuid, Vec<Uuid>)>,
    gate: Option<Arc<Notify>>,
    error: Option<String>,
}

#[async_trait]
impl GattServer for FakeGatt {
    async fn primary_services(&self) -> Result<Vec<Arc<dyn GattService>>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.error {
            return Err(Error::platform(message.clone()));
        }
        Ok(self
            .services
            .iter()
            .map(|(uuid, characteristics)| {
                Arc::new(FakeService {
                    uuid: *uuid,
                    characteristics: characteristics.clone(),
                }) as Arc<dyn GattService>
            })
            .collect())
    }
}

struct FakeService {
    uuid: Uuid,
    characteristics: Vec<Uuid>,
}

#[async_trait]
impl GattService for FakeService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn characteristics(&self) -> Result<Vec<CharacteristicDescriptor>> {
        Ok(self
            .characteristics
            .iter()
            .copied()
            .map(CharacteristicDescriptor::new)
            .collect())
    }
}
