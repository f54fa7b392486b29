//! Tester configuration.

use std::time::Duration;

/// Default capacity of the state notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Default bound on a characteristic topology fetch.
pub const DEFAULT_TOPOLOGY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time the btleplug chooser listens for advertisements.
pub const DEFAULT_CHOOSER_WINDOW: Duration = Duration::from_secs(5);

/// Settings for a [`BleTester`](crate::BleTester) session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TesterConfig {
    /// Capacity of the snapshot broadcast channel.
    ///
    /// Slow subscribers that fall further behind than this skip snapshots.
    pub event_capacity: usize,

    /// Upper bound on service plus characteristic enumeration.
    pub topology_timeout: Duration,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            topology_timeout: DEFAULT_TOPOLOGY_TIMEOUT,
        }
    }
}

impl TesterConfig {
    /// Set the snapshot channel capacity (at least 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the topology fetch timeout.
    pub fn with_topology_timeout(mut self, timeout: Duration) -> Self {
        self.topology_timeout = timeout;
        self
    }
}

/// Settings for the btleplug device chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChooserConfig {
    /// How long to scan before picking a device.
    pub scan_window: Duration,
}

impl Default for ChooserConfig {
    fn default() -> Self {
        Self {
            scan_window: DEFAULT_CHOOSER_WINDOW,
        }
    }
}

impl ChooserConfig {
    /// Set the chooser scan window.
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }
}
