//! Error types for the ble-tester crate.

use thiserror::Error;

/// The main error type for this crate.
///
/// Platform failures (`Bluetooth`, `Platform`, ...) are wrapped by the
/// action that hit them (`PairFailed`, `ConnectFailed`, ...) so callers can
/// tell which inline indicator was raised while keeping the raw cause.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The device chooser finished without a device.
    #[error("No device selected")]
    NoDeviceSelected,

    /// Error reported by a non-btleplug adapter implementation.
    #[error("Platform error: {message}")]
    Platform {
        /// Message from the platform.
        message: String,
    },

    /// A platform operation did not resolve in time.
    #[error("Operation timed out")]
    Timeout,

    /// No device has been installed as the active one.
    #[error("No active device")]
    NoActiveDevice,

    /// The handle is not the currently active device.
    #[error("Device {identifier} is not the active device")]
    InactiveDevice {
        /// Identifier of the rejected handle.
        identifier: String,
    },

    /// The active device is already connected.
    #[error("Device already connected")]
    AlreadyConnected,

    /// A connection attempt is already pending for the active device.
    #[error("Connection already in progress")]
    ConnectionInProgress,

    /// A scan session is already outstanding.
    #[error("Scan already in progress")]
    ScanInProgress,

    /// The result arrived after the device was replaced or disconnected.
    #[error("Result superseded by a newer session")]
    Superseded,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Requesting a device through the chooser failed.
    #[error("Failed to pair: {source}")]
    PairFailed {
        /// The underlying platform error.
        source: Box<Error>,
    },

    /// Connecting to the active device failed.
    #[error("Failed to connect: {source}")]
    ConnectFailed {
        /// The underlying platform error.
        source: Box<Error>,
    },

    /// Enumerating services or characteristics failed.
    #[error("Failed to fetch characteristics: {source}")]
    TopologyFetchFailed {
        /// The underlying platform error.
        source: Box<Error>,
    },

    /// Starting an advertisement scan failed.
    #[error("Failed to start scan: {source}")]
    ScanFailed {
        /// The underlying platform error.
        source: Box<Error>,
    },
}

impl Error {
    /// Build a platform error from any message.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// The platform error wrapped by an action failure, or `self`.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::PairFailed { source }
            | Self::ConnectFailed { source }
            | Self::TopologyFetchFailed { source }
            | Self::ScanFailed { source } => source.root_cause(),
            other => other,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_keeps_platform_cause() {
        let err = Error::ConnectFailed {
            source: Box::new(Error::platform("GATT server unreachable")),
        };

        assert_eq!(
            err.to_string(),
            "Failed to connect: Platform error: GATT server unreachable"
        );
        assert!(matches!(err.root_cause(), Error::Platform { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_root_cause_of_plain_error() {
        let err = Error::NoActiveDevice;
        assert!(matches!(err.root_cause(), Error::NoActiveDevice));
    }
}
