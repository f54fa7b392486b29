//! BLE advertisement scanning.
//!
//! A scan is started and stopped again as soon as the platform reports it
//! running. No advertisement data is collected; the point is to exercise the
//! platform's scan permission and start/stop path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ble::adapter::{Adapter, ScanOptions};
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Runs single passive advertisement scans.
pub struct ScanSession {
    adapter: Arc<dyn Adapter>,
    session: Arc<DeviceSession>,
    is_scanning: AtomicBool,
}

impl ScanSession {
    /// Create a scan session on `adapter`, reporting failures to `session`.
    pub fn new(adapter: Arc<dyn Adapter>, session: Arc<DeviceSession>) -> Self {
        Self {
            adapter,
            session,
            is_scanning: AtomicBool::new(false),
        }
    }

    /// Check if a scan is outstanding.
    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::SeqCst)
    }

    /// Start a scan accepting all advertisements and stop it right away.
    ///
    /// `stop` is always called before this returns when the start
    /// succeeded, and never when it failed.
    pub async fn scan_once(&self) -> Result<()> {
        if self
            .is_scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scan already outstanding, rejecting request");
            return Err(Error::ScanInProgress);
        }

        let _guard = ScanGuard(&self.is_scanning);
        self.run().await
    }

    async fn run(&self) -> Result<()> {
        info!("Starting BLE advertisement scan");

        let options = ScanOptions {
            accept_all_advertisements: true,
        };

        let scan = match self.adapter.request_scan(options).await {
            Ok(scan) => scan,
            Err(e) => {
                warn!("Failed to start scan: {}", e);
                self.session.record_scan(Err(&e));
                return Err(Error::ScanFailed {
                    source: Box::new(e),
                });
            }
        };

        debug!("Scan started, stopping");
        if let Err(e) = scan.stop().await {
            warn!("Failed to stop scan: {}", e);
        }

        self.session.record_scan(Ok(()));
        info!("Scan complete");
        Ok(())
    }
}

/// Clears the scanning flag even when the scan future is dropped early.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::adapter::{MockAdapter, MockScanHandle, ScanHandle};
    use crate::testing::FakeAdapter;

    fn scanning_adapter(stop_result: fn() -> Result<()>) -> MockAdapter {
        let mut scan = MockScanHandle::new();
        scan.expect_stop().times(1).returning(move || stop_result());

        let mut adapter = MockAdapter::new();
        adapter
            .expect_request_scan()
            .withf(|options| options.accept_all_advertisements)
            .times(1)
            .return_once(move |_| Ok(Box::new(scan) as Box<dyn ScanHandle>));
        adapter
    }

    #[tokio::test]
    async fn test_scan_stops_before_returning() {
        let adapter = Arc::new(scanning_adapter(|| Ok(())));
        let session = Arc::new(DeviceSession::default());
        let scanner = ScanSession::new(adapter, session.clone());

        scanner.scan_once().await.unwrap();

        assert!(!scanner.is_scanning());
        assert!(session.snapshot().scan_error.is_none());
    }

    #[tokio::test]
    async fn test_stop_failure_is_not_a_scan_failure() {
        let adapter = Arc::new(scanning_adapter(|| Err(Error::platform("already stopped"))));
        let session = Arc::new(DeviceSession::default());
        let scanner = ScanSession::new(adapter, session.clone());

        scanner.scan_once().await.unwrap();

        assert!(session.snapshot().scan_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_start_never_stops() {
        let adapter = Arc::new(FakeAdapter::new().failing_scan("Scanning not permitted"));
        let session = Arc::new(DeviceSession::default());
        let scanner = ScanSession::new(adapter.clone(), session.clone());

        let err = scanner.scan_once().await.unwrap_err();

        assert!(matches!(err, Error::ScanFailed { .. }));
        assert_eq!(adapter.scan_starts(), 1);
        assert_eq!(adapter.scan_stops(), 0);
        assert_eq!(
            session.snapshot().scan_error.as_deref(),
            Some("Platform error: Scanning not permitted")
        );
        assert!(!scanner.is_scanning());
    }

    #[tokio::test]
    async fn test_successful_scan_stops_once() {
        let adapter = Arc::new(FakeAdapter::new());
        let session = Arc::new(DeviceSession::default());
        let scanner = ScanSession::new(adapter.clone(), session);

        scanner.scan_once().await.unwrap();
        scanner.scan_once().await.unwrap();

        assert_eq!(adapter.scan_starts(), 2);
        assert_eq!(adapter.scan_stops(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_scan_is_rejected() {
        let adapter = Arc::new(FakeAdapter::new().hanging_scan());
        let session = Arc::new(DeviceSession::default());
        let scanner = Arc::new(ScanSession::new(adapter, session));

        let first = {
            let scanner = scanner.clone();
            tokio::spawn(async move { scanner.scan_once().await })
        };
        tokio::task::yield_now().await;

        assert!(scanner.is_scanning());
        assert!(matches!(
            scanner.scan_once().await,
            Err(Error::ScanInProgress)
        ));
        first.abort();
        let _ = first.await;
        assert!(!scanner.is_scanning());
    }
}
