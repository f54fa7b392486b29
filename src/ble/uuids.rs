//! Bluetooth UUID helpers.
//!
//! Services and characteristics are identified by 128-bit UUIDs. SIG-assigned
//! ones are usually written as 16-bit or 32-bit aliases of the Bluetooth base
//! UUID, so user input accepts both forms.

use uuid::Uuid;

use crate::error::{Error, Result};

/// The Bluetooth base UUID (`00000000-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb);

/// Standard Heart Rate Service UUID.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID.
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);
/// Body Sensor Location characteristic UUID.
pub const BODY_SENSOR_LOCATION_UUID: Uuid =
    Uuid::from_u128(0x0000_2a38_0000_1000_8000_00805f9b34fb);

/// Standard Battery Service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic UUID.
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);

/// Standard Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);

/// GATT service names accepted in place of a UUID.
const SERVICE_NAMES: &[(&str, Uuid)] = &[
    ("heart_rate", HEART_RATE_SERVICE_UUID),
    ("battery_service", BATTERY_SERVICE_UUID),
    ("device_information", DEVICE_INFO_SERVICE_UUID),
];

/// Look up a GATT service by its assigned name, e.g. `heart_rate`.
pub fn service_by_name(name: &str) -> Option<Uuid> {
    SERVICE_NAMES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, uuid)| *uuid)
}

/// Expand a 32-bit SIG alias against the base UUID.
pub const fn uuid_from_alias(alias: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | ((alias as u128) << 96))
}

/// The 32-bit alias of a UUID derived from the base UUID, if it is one.
pub fn alias_of(uuid: &Uuid) -> Option<u32> {
    let value = uuid.as_u128();
    if value & ((1u128 << 96) - 1) == BLUETOOTH_BASE_UUID.as_u128() {
        Some((value >> 96) as u32)
    } else {
        None
    }
}

/// Parse a service identifier typed by a user.
///
/// Accepts a full UUID string, a GATT service name such as
/// `battery_service`, or a 16-bit/32-bit alias written as hex, with or
/// without a `0x` prefix.
pub fn parse_service_uuid(text: &str) -> Result<Uuid> {
    let trimmed = text.trim();
    let invalid = || Error::InvalidParameter {
        name: "service_uuid".to_string(),
        value: text.to_string(),
    };

    if let Ok(uuid) = Uuid::parse_str(trimmed) {
        return Ok(uuid);
    }
    if let Some(uuid) = service_by_name(trimmed) {
        return Ok(uuid);
    }

    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex.is_empty() || hex.len() > 8 {
        return Err(invalid());
    }

    u32::from_str_radix(hex, 16)
        .map(uuid_from_alias)
        .map_err(|_| invalid())
}
