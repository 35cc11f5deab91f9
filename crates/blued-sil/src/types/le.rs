use blued_common::Address;
use serde::{Deserialize, Serialize};

/// Compound filter registered for one LE scan subscription.
///
/// Every part is optional; an empty filter matches every advertisement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeDiscoveryFilter {
    /// Match on the advertising device address.
    pub address: Option<Address>,
    /// Match on the advertised device name.
    pub name: Option<String>,
    /// Match on an advertised service UUID.
    pub service_uuid: Option<UuidFilter>,
    /// Match on advertised service data.
    pub service_data: Option<ServiceDataFilter>,
    /// Match on manufacturer-specific data.
    pub manufacturer_data: Option<ManufacturerDataFilter>,
}

/// Service-UUID filter with an optional bit mask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UuidFilter {
    /// UUID to match, 16-bit short or full form.
    pub uuid: Option<String>,
    /// Mask applied to the UUID before matching.
    pub mask: Option<String>,
}

/// Service-data filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceDataFilter {
    /// UUID the service data belongs to.
    pub uuid: Option<String>,
    /// Expected data bytes.
    pub data: Vec<u8>,
    /// Mask applied to the data before matching.
    pub mask: Vec<u8>,
}

/// Manufacturer-data filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManufacturerDataFilter {
    /// Company identifier.
    pub id: Option<u16>,
    /// Expected data bytes.
    pub data: Vec<u8>,
    /// Mask applied to the data before matching.
    pub mask: Vec<u8>,
}

/// Parameters of one advertising instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvertiserSettings {
    /// Whether the advertisement accepts connections.
    pub connectable: bool,
    /// Minimum advertising interval in units of 0.625 ms.
    pub min_interval: u32,
    /// Maximum advertising interval in units of 0.625 ms.
    pub max_interval: u32,
    /// Transmit power in dBm.
    pub tx_power: i32,
    /// Advertising timeout in milliseconds, zero disables the timeout.
    pub timeout: u32,
}

impl Default for AdvertiserSettings {
    fn default() -> Self {
        Self {
            connectable: true,
            min_interval: 0,
            max_interval: 0,
            tx_power: 0,
            timeout: 0,
        }
    }
}

/// Payload of an advertisement or scan response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvertiseData {
    /// Include the TX power level field.
    pub include_tx_power: bool,
    /// Include the adapter name (scan responses only).
    pub include_name: bool,
    /// Manufacturer-specific data bytes.
    pub manufacturer_data: Vec<u8>,
    /// Advertised services, at most one of which may carry data.
    pub services: Vec<AdvertisedService>,
    /// Raw AD structures appended verbatim.
    pub proprietary_data: Vec<ProprietaryData>,
}

/// One advertised service entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvertisedService {
    /// Service UUID, 16-bit short form.
    pub uuid: String,
    /// Service data bytes.
    pub data: Vec<u8>,
}

/// A raw AD structure (length and type prepended on the air).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProprietaryData {
    /// AD type octet.
    #[serde(rename = "type")]
    pub ad_type: u8,
    /// AD payload bytes.
    pub data: Vec<u8>,
}
