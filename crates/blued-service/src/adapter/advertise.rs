//! Advertising payload size accounting.
//!
//! A legacy advertising PDU carries at most 31 bytes. The composed size
//! of an [`AdvertiseData`] is checked before anything reaches the
//! stack: the flags field (advertise data only), one length/type
//! overhead per AD field, 16-bit service UUIDs, at most one service
//! data entry, manufacturer data, raw proprietary structures, the TX
//! power byte and the adapter name.

use blued_sil::types::AdvertiseData;

/// Payload limit of a legacy advertising PDU.
pub const MAX_ADVERTISING_DATA_BYTES: usize = 31;

const FLAGS_FIELD_BYTES: usize = 3;
const OVERHEAD_BYTES_PER_FIELD: usize = 2;
const UUID_16_BYTES: usize = 2;

/// Computes the on-air size of an advertise data block.
pub fn advertise_data_size(
    data: &AdvertiseData,
    flags_required: bool,
    adapter_name_len: usize,
) -> usize {
    let mut size = if flags_required { FLAGS_FIELD_BYTES } else { 0 };

    // Only the first service carrying data contributes a service-data field.
    if let Some(service) = data.services.iter().find(|service| !service.data.is_empty()) {
        size += OVERHEAD_BYTES_PER_FIELD + service.data.len();
    }

    if !data.manufacturer_data.is_empty() {
        size += OVERHEAD_BYTES_PER_FIELD + data.manufacturer_data.len();
    }

    if !data.services.is_empty() {
        size += OVERHEAD_BYTES_PER_FIELD + data.services.len() * UUID_16_BYTES;
    }

    for proprietary in &data.proprietary_data {
        size += OVERHEAD_BYTES_PER_FIELD + proprietary.data.len();
    }

    if data.include_tx_power {
        size += OVERHEAD_BYTES_PER_FIELD + 1;
    }

    if data.include_name {
        size += OVERHEAD_BYTES_PER_FIELD + adapter_name_len;
    }

    size
}

/// Whether an advertise data block fits a legacy PDU.
pub fn fits_advertising_pdu(
    data: &AdvertiseData,
    flags_required: bool,
    adapter_name_len: usize,
) -> bool {
    advertise_data_size(data, flags_required, adapter_name_len) <= MAX_ADVERTISING_DATA_BYTES
}

#[cfg(test)]
mod tests {
    use blued_sil::types::{AdvertisedService, ProprietaryData};

    use super::*;

    #[test]
    fn empty_data_is_flags_only() {
        let data = AdvertiseData::default();
        assert_eq!(advertise_data_size(&data, true, 0), 3);
        assert_eq!(advertise_data_size(&data, false, 0), 0);
    }

    #[test]
    fn uuids_and_service_data_are_counted() {
        let data = AdvertiseData {
            services: vec![
                AdvertisedService {
                    uuid: "180d".into(),
                    data: vec![1, 2, 3, 4],
                },
                AdvertisedService {
                    uuid: "180f".into(),
                    data: Vec::new(),
                },
            ],
            ..AdvertiseData::default()
        };
        // flags (3) + service data (2 + 4) + uuid list (2 + 2 * 2)
        assert_eq!(advertise_data_size(&data, true, 0), 15);
    }

    #[test]
    fn manufacturer_tx_power_and_name_are_counted() {
        let data = AdvertiseData {
            include_tx_power: true,
            include_name: true,
            manufacturer_data: vec![0x4c, 0x00, 0x02, 0x15],
            ..AdvertiseData::default()
        };
        // manufacturer (2 + 4) + tx power (2 + 1) + name (2 + 6)
        assert_eq!(advertise_data_size(&data, false, 6), 17);
    }

    #[test]
    fn limit_is_31_bytes() {
        let just_fits = AdvertiseData {
            manufacturer_data: vec![0; 26],
            ..AdvertiseData::default()
        };
        assert!(fits_advertising_pdu(&just_fits, true, 0));

        let too_big = AdvertiseData {
            manufacturer_data: vec![0; 27],
            ..AdvertiseData::default()
        };
        assert!(!fits_advertising_pdu(&too_big, true, 0));
    }

    #[test]
    fn proprietary_structures_are_counted() {
        let data = AdvertiseData {
            proprietary_data: vec![ProprietaryData {
                ad_type: 0xff,
                data: vec![1, 2, 3],
            }],
            ..AdvertiseData::default()
        };
        assert_eq!(advertise_data_size(&data, false, 0), 5);
    }
}
