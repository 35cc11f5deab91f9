use blued_common::Address;
use serde::{Deserialize, Serialize};

/// Transport type of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Classic BR/EDR device.
    BrEdr,
    /// Low-energy only device.
    Ble,
    /// Dual-mode device.
    Dual,
}

impl DeviceType {
    /// Wire representation (`bredr`, `ble`, `dual`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BrEdr => "bredr",
            Self::Ble => "ble",
            Self::Dual => "dual",
        }
    }
}

/// One device property as reported by the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceProperty {
    /// Device address.
    Address(Address),
    /// Remote device name.
    Name(String),
    /// Transport type.
    TypeOfDevice(DeviceType),
    /// Class-of-device bitmask.
    ClassOfDevice(u32),
    /// Whether a bond record exists for the device.
    Paired(bool),
    /// Whether the device is trusted.
    Trusted(bool),
    /// Whether connections from the device are rejected.
    Blocked(bool),
    /// Whether any link to the device is up.
    Connected(bool),
    /// Received signal strength.
    Rssi(i16),
    /// Raw manufacturer-specific advertisement payload.
    ManufacturerData(Vec<u8>),
    /// Raw scan record.
    ScanRecord(Vec<u8>),
    /// Remote service-class UUIDs.
    Uuids(Vec<String>),
    /// MAS instance names offered by the device (MAP).
    MapInstances(Vec<String>),
}
