//! Per-adapter device inventory.
//!
//! The inventory holds the classic devices the adapter has discovered
//! plus, per active LE scan, the devices that passed that scan's
//! filter. Devices are exclusively owned here; removal destroys them.

use std::collections::{BTreeMap, HashMap};

use blued_common::Address;
use blued_sil::types::{DeviceProperty, DeviceType};
use serde_json::{Value, json};

/// One remote device as mirrored from the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Device address.
    pub address: Address,
    /// Remote name, empty until resolved.
    pub name: String,
    /// Transport type.
    pub device_type: DeviceType,
    /// Class-of-device bitmask.
    pub class_of_device: u32,
    /// Whether a bond record exists.
    pub paired: bool,
    /// Whether this device currently holds the adapter's pairing slot.
    pub pairing: bool,
    /// Whether the device is trusted.
    pub trusted: bool,
    /// Whether connections from the device are rejected.
    pub blocked: bool,
    /// Whether any link to the device is up.
    pub connected: bool,
    /// Received signal strength, when known.
    pub rssi: Option<i16>,
    /// Raw manufacturer-specific advertisement payload.
    pub manufacturer_data: Vec<u8>,
    /// Raw scan record.
    pub scan_record: Vec<u8>,
    /// Remote service-class UUIDs.
    pub uuids: Vec<String>,
    /// MAS instance names offered by the device.
    pub map_instances: Vec<String>,
}

impl Device {
    /// Builds a device from a property list; `None` without an address.
    pub fn from_properties(properties: Vec<DeviceProperty>) -> Option<Self> {
        let address = properties.iter().find_map(|property| match property {
            DeviceProperty::Address(address) => Some(*address),
            _ => None,
        })?;
        let mut device = Self {
            address,
            name: String::new(),
            device_type: DeviceType::BrEdr,
            class_of_device: 0,
            paired: false,
            pairing: false,
            trusted: false,
            blocked: false,
            connected: false,
            rssi: None,
            manufacturer_data: Vec::new(),
            scan_record: Vec::new(),
            uuids: Vec::new(),
            map_instances: Vec::new(),
        };
        device.update(properties);
        Some(device)
    }

    /// Applies changed properties, reporting whether anything changed.
    pub fn update(&mut self, properties: Vec<DeviceProperty>) -> bool {
        let before = self.clone();
        for property in properties {
            match property {
                DeviceProperty::Address(address) => self.address = address,
                DeviceProperty::Name(name) => self.name = name,
                DeviceProperty::TypeOfDevice(device_type) => self.device_type = device_type,
                DeviceProperty::ClassOfDevice(class) => self.class_of_device = class,
                DeviceProperty::Paired(paired) => self.paired = paired,
                DeviceProperty::Trusted(trusted) => self.trusted = trusted,
                DeviceProperty::Blocked(blocked) => self.blocked = blocked,
                DeviceProperty::Connected(connected) => self.connected = connected,
                DeviceProperty::Rssi(rssi) => self.rssi = Some(rssi),
                DeviceProperty::ManufacturerData(data) => self.manufacturer_data = data,
                DeviceProperty::ScanRecord(record) => self.scan_record = record,
                DeviceProperty::Uuids(uuids) => self.uuids = uuids,
                DeviceProperty::MapInstances(instances) => self.map_instances = instances,
            }
        }
        *self != before
    }

    /// The wire representation used by the device listings.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "address": self.address,
            "name": self.name,
            "typeOfDevice": self.device_type.as_str(),
            "classOfDevice": self.class_of_device,
            "paired": self.paired,
            "pairing": self.pairing,
            "trusted": self.trusted,
            "blocked": self.blocked,
            "connected": self.connected,
            "manufacturerData": self.manufacturer_data,
            "scanRecord": self.scan_record,
            "serviceClasses": self.uuids,
        });
        if let (Some(rssi), Some(object)) = (self.rssi, body.as_object_mut()) {
            object.insert("rssi".into(), json!(rssi));
        }
        if let (false, Some(object)) = (self.map_instances.is_empty(), body.as_object_mut()) {
            object.insert("mapInstances".into(), json!(self.map_instances));
        }
        body
    }
}

/// Per-caller discovery filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFilter {
    /// Class-of-device mask; zero admits every class.
    pub class_of_device: u32,
    /// Service UUID; empty admits every device.
    pub uuid: String,
}

impl DeviceFilter {
    /// Whether the filter admits `device`.
    ///
    /// A class-of-device filter admits devices whose class ANDed with
    /// the filter equals the filter. The UUID check applies to BR/EDR
    /// and dual-mode devices only; BLE devices bypass it.
    pub fn admits(&self, device: &Device) -> bool {
        if self.class_of_device != 0
            && device.class_of_device & self.class_of_device != self.class_of_device
        {
            return false;
        }
        if !self.uuid.is_empty() && device.device_type != DeviceType::Ble {
            return device
                .uuids
                .iter()
                .any(|uuid| uuid.eq_ignore_ascii_case(&self.uuid));
        }
        true
    }
}

/// The device maps of one adapter.
#[derive(Debug, Default)]
pub struct DeviceInventory {
    devices: BTreeMap<Address, Device>,
    le_devices_by_scan: HashMap<u32, BTreeMap<Address, Device>>,
    link_keys: HashMap<Address, Vec<u8>>,
}

impl DeviceInventory {
    /// Looks a device up by address.
    pub fn device(&self, address: &Address) -> Option<&Device> {
        self.devices.get(address)
    }

    /// Mutable device lookup.
    pub fn device_mut(&mut self, address: &Address) -> Option<&mut Device> {
        self.devices.get_mut(address)
    }

    /// All known devices in address order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Create-or-update from a discovery observation.
    pub fn device_found(&mut self, properties: Vec<DeviceProperty>) -> Option<Address> {
        let address = properties.iter().find_map(|property| match property {
            DeviceProperty::Address(address) => Some(*address),
            _ => None,
        })?;
        match self.devices.get_mut(&address) {
            Some(device) => {
                device.update(properties);
            }
            None => {
                let device = Device::from_properties(properties)?;
                self.devices.insert(address, device);
            }
        }
        Some(address)
    }

    /// Applies a property change, reporting whether anything changed.
    pub fn device_properties_changed(
        &mut self,
        address: &Address,
        properties: Vec<DeviceProperty>,
    ) -> bool {
        self.devices
            .get_mut(address)
            .map(|device| device.update(properties))
            .unwrap_or(false)
    }

    /// Destroys a device, reporting whether it existed.
    pub fn device_removed(&mut self, address: &Address) -> bool {
        self.devices.remove(address).is_some()
    }

    /// Devices admitted by `filter`, in address order.
    pub fn filtered_devices(&self, filter: &DeviceFilter) -> Vec<&Device> {
        self.devices
            .values()
            .filter(|device| filter.admits(device))
            .collect()
    }

    /// The scan-scoped view for `scan_id`, in address order.
    pub fn le_devices(&self, scan_id: u32) -> impl Iterator<Item = &Device> {
        self.le_devices_by_scan
            .get(&scan_id)
            .into_iter()
            .flat_map(|devices| devices.values())
    }

    /// Create-or-update within a scan view.
    pub fn le_device_found(&mut self, scan_id: u32, properties: Vec<DeviceProperty>) -> bool {
        let view = self.le_devices_by_scan.entry(scan_id).or_default();
        let Some(address) = properties.iter().find_map(|property| match property {
            DeviceProperty::Address(address) => Some(*address),
            _ => None,
        }) else {
            return false;
        };
        match view.get_mut(&address) {
            Some(device) => {
                device.update(properties);
            }
            None => {
                let Some(device) = Device::from_properties(properties) else {
                    return false;
                };
                view.insert(address, device);
            }
        }
        true
    }

    /// Applies a property change within a scan view.
    pub fn le_device_properties_changed(
        &mut self,
        scan_id: u32,
        address: &Address,
        properties: Vec<DeviceProperty>,
    ) -> bool {
        self.le_devices_by_scan
            .get_mut(&scan_id)
            .and_then(|view| view.get_mut(address))
            .map(|device| device.update(properties))
            .unwrap_or(false)
    }

    /// Removes a device from a scan view.
    pub fn le_device_removed(&mut self, scan_id: u32, address: &Address) -> bool {
        self.le_devices_by_scan
            .get_mut(&scan_id)
            .map(|view| view.remove(address).is_some())
            .unwrap_or(false)
    }

    /// Drops a whole scan view.
    pub fn drop_scan_view(&mut self, scan_id: u32) {
        self.le_devices_by_scan.remove(&scan_id);
    }

    /// Stores a link key for a device.
    pub fn link_key_created(&mut self, address: Address, link_key: Vec<u8>) {
        self.link_keys.insert(address, link_key);
    }

    /// Removes the link key of a device.
    pub fn link_key_destroyed(&mut self, address: &Address) {
        self.link_keys.remove(address);
    }

    /// The link key of a device, empty when none is stored.
    pub fn link_key(&self, address: &Address) -> &[u8] {
        self.link_keys
            .get(address)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(last: u8) -> Address {
        Address::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, last])
    }

    fn found(inventory: &mut DeviceInventory, last: u8, extra: Vec<DeviceProperty>) {
        let mut properties = vec![DeviceProperty::Address(address(last))];
        properties.extend(extra);
        inventory.device_found(properties);
    }

    #[test]
    fn found_then_removed() {
        let mut inventory = DeviceInventory::default();
        found(&mut inventory, 0x01, vec![DeviceProperty::Name("x".into())]);
        assert!(inventory.device(&address(0x01)).is_some());
        assert!(inventory.device_removed(&address(0x01)));
        assert!(inventory.device(&address(0x01)).is_none());
        assert!(!inventory.device_removed(&address(0x01)));
    }

    #[test]
    fn update_reports_changes_only() {
        let mut inventory = DeviceInventory::default();
        found(&mut inventory, 0x01, vec![DeviceProperty::Name("x".into())]);
        assert!(!inventory
            .device_properties_changed(&address(0x01), vec![DeviceProperty::Name("x".into())]));
        assert!(inventory
            .device_properties_changed(&address(0x01), vec![DeviceProperty::Name("y".into())]));
    }

    #[test]
    fn class_of_device_filter_is_an_and_mask() {
        let mut inventory = DeviceInventory::default();
        found(
            &mut inventory,
            0x01,
            vec![DeviceProperty::ClassOfDevice(0x24_04_14)],
        );
        let matching = DeviceFilter {
            class_of_device: 0x20_00_00,
            ..DeviceFilter::default()
        };
        let exceeding = DeviceFilter {
            class_of_device: 0x10_00_00,
            ..DeviceFilter::default()
        };
        assert_eq!(inventory.filtered_devices(&matching).len(), 1);
        assert!(inventory.filtered_devices(&exceeding).is_empty());
    }

    #[test]
    fn uuid_filter_bypasses_ble_devices() {
        let uuid = "0000110b-0000-1000-8000-00805f9b34fb";
        let mut inventory = DeviceInventory::default();
        found(
            &mut inventory,
            0x01,
            vec![
                DeviceProperty::TypeOfDevice(DeviceType::BrEdr),
                DeviceProperty::Uuids(vec![uuid.to_owned()]),
            ],
        );
        found(
            &mut inventory,
            0x02,
            vec![DeviceProperty::TypeOfDevice(DeviceType::BrEdr)],
        );
        found(
            &mut inventory,
            0x03,
            vec![DeviceProperty::TypeOfDevice(DeviceType::Ble)],
        );

        let filter = DeviceFilter {
            uuid: uuid.to_owned(),
            ..DeviceFilter::default()
        };
        let admitted: Vec<_> = inventory
            .filtered_devices(&filter)
            .iter()
            .map(|device| device.address)
            .collect();
        assert_eq!(admitted, vec![address(0x01), address(0x03)]);
    }

    #[test]
    fn scan_views_are_independent() {
        let mut inventory = DeviceInventory::default();
        inventory.le_device_found(1, vec![DeviceProperty::Address(address(0x01))]);
        inventory.le_device_found(2, vec![DeviceProperty::Address(address(0x02))]);

        assert_eq!(inventory.le_devices(1).count(), 1);
        assert_eq!(inventory.le_devices(2).count(), 1);

        assert!(inventory.le_device_removed(1, &address(0x01)));
        assert_eq!(inventory.le_devices(1).count(), 0);
        assert_eq!(inventory.le_devices(2).count(), 1);
    }

    #[test]
    fn link_keys_follow_their_device() {
        let mut inventory = DeviceInventory::default();
        inventory.link_key_created(address(0x01), vec![1, 2, 3]);
        assert_eq!(inventory.link_key(&address(0x01)), &[1, 2, 3]);
        inventory.link_key_destroyed(&address(0x01));
        assert!(inventory.link_key(&address(0x01)).is_empty());
    }
}
