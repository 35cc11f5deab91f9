//! Per-adapter state and the `/adapter`, `/device` and `/le` handlers.

pub(crate) mod advertise;
pub(crate) mod inventory;
pub(crate) mod le;
pub(crate) mod pair;
pub(crate) mod pairing;

use std::collections::HashMap;
use std::sync::Arc;

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode, SubscriptionPoint, WatchContext, params};
use blued_sil::types::{AdapterProperty, DeviceProperty, PairingIoCapability, ProfileId};
use blued_sil::{AdapterEvent, SilAdapter};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::service::{Message, MessageSender, Resume, Service, defer};

use inventory::{DeviceFilter, DeviceInventory};
use pair::PairState;

pub(crate) use inventory::Device;

/// Filter registration of one caller, optionally with a live watch.
struct FilteredEntry {
    filter: DeviceFilter,
    watch: Option<ClientWatch>,
}

/// Outcome of applying a property change set.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PropertyOutcome {
    /// Post to `getStatus` subscribers.
    pub status: bool,
    /// Post to `queryAvailable` subscribers.
    pub available: bool,
}

/// One physical adapter: property mirror, device inventory, pairing
/// slot, LE scan state and advertising bookkeeping.
pub struct AdapterManager {
    pub(crate) address: Address,
    pub(crate) sil: Arc<dyn SilAdapter>,
    pub(crate) tx: MessageSender,
    pub(crate) io_capability: PairingIoCapability,
    pub(crate) name: String,
    pub(crate) interface_name: String,
    stack_name: String,
    stack_version: String,
    firmware_version: String,
    pub(crate) powered: bool,
    discoverable: bool,
    discoverable_timeout: u32,
    discovery_timeout: u32,
    pub(crate) discovering: bool,
    class_of_device: u32,
    is_default: bool,
    uuids: Vec<String>,
    pub(crate) pair_state: PairState,
    pub(crate) inventory: DeviceInventory,
    pub(crate) outgoing_pairing_watch: Option<ClientWatch>,
    pub(crate) incoming_pairing_watch: Option<ClientWatch>,
    devices_subscriptions: SubscriptionPoint,
    connected_subscriptions: SubscriptionPoint,
    filtered: HashMap<String, FilteredEntry>,
    pub(crate) scan_watches: HashMap<u32, ClientWatch>,
    pub(crate) advertisers: HashMap<u8, ClientWatch>,
}

impl AdapterManager {
    pub(crate) fn new(
        address: Address,
        sil: Arc<dyn SilAdapter>,
        tx: MessageSender,
        is_default: bool,
        io_capability: PairingIoCapability,
    ) -> Self {
        let interface_name = sil.interface_name();
        Self {
            address,
            sil,
            tx,
            io_capability,
            name: String::new(),
            interface_name,
            stack_name: String::new(),
            stack_version: String::new(),
            firmware_version: String::new(),
            powered: false,
            discoverable: false,
            discoverable_timeout: 0,
            discovery_timeout: 0,
            discovering: false,
            class_of_device: 0,
            is_default,
            uuids: Vec::new(),
            pair_state: PairState::default(),
            inventory: DeviceInventory::default(),
            outgoing_pairing_watch: None,
            incoming_pairing_watch: None,
            devices_subscriptions: SubscriptionPoint::new(),
            connected_subscriptions: SubscriptionPoint::new(),
            filtered: HashMap::new(),
            scan_watches: HashMap::new(),
            advertisers: HashMap::new(),
        }
    }

    pub(crate) fn set_default(&mut self, is_default: bool) {
        self.is_default = is_default;
    }

    pub(crate) fn advertising(&self) -> bool {
        !self.advertisers.is_empty()
    }

    /// The adapter's entry in the `getStatus` response.
    pub(crate) fn status_json(&self) -> Value {
        json!({
            "adapterAddress": self.address,
            "name": self.name,
            "interfaceName": self.interface_name,
            "powered": self.powered,
            "discovering": self.discovering,
            "discoveryTimeout": self.discovery_timeout,
            "discoverable": self.discoverable,
            "discoverableTimeout": self.discoverable_timeout,
            "pairable": self.pair_state.is_pairable(),
            "pairableTimeout": self.pair_state.pairable_timeout(),
            "pairing": self.pair_state.is_pairing(),
        })
    }

    /// The adapter's entry in the `queryAvailable` response.
    pub(crate) fn available_json(&self) -> Value {
        json!({
            "adapterAddress": self.address,
            "default": self.is_default,
            "classOfDevice": self.class_of_device,
            "stackName": self.stack_name,
            "stackVersion": self.stack_version,
            "firmwareVersion": self.firmware_version,
            "serviceClasses": self.supported_service_classes_json(),
        })
    }

    fn supported_service_classes_json(&self) -> Vec<Value> {
        ProfileId::ALL
            .iter()
            .filter(|profile| {
                profile
                    .uuids()
                    .iter()
                    .any(|uuid| self.uuids.iter().any(|known| known.eq_ignore_ascii_case(uuid)))
            })
            .map(|profile| {
                json!({
                    "name": profile.mnemonic(),
                    "category": profile.category(),
                })
            })
            .collect()
    }

    /// Mirrors a stack property change set, reporting what to post.
    pub(crate) fn apply_properties(&mut self, properties: Vec<AdapterProperty>) -> PropertyOutcome {
        let mut outcome = PropertyOutcome::default();
        for property in properties {
            match property {
                AdapterProperty::Name(name) | AdapterProperty::Alias(name) => {
                    self.name = name;
                    outcome.status = true;
                }
                AdapterProperty::StackName(name) => {
                    self.stack_name = name;
                    outcome.available = true;
                }
                AdapterProperty::StackVersion(version) => {
                    self.stack_version = version;
                    outcome.available = true;
                }
                AdapterProperty::FirmwareVersion(version) => {
                    self.firmware_version = version;
                    outcome.available = true;
                }
                AdapterProperty::Address(address) => {
                    if address != self.address {
                        warn!(
                            adapter = %self.address,
                            reported = %address,
                            "ignoring address change of live adapter"
                        );
                    }
                    outcome.available = true;
                }
                AdapterProperty::InterfaceName(interface) => {
                    self.interface_name = interface;
                    outcome.status = true;
                }
                AdapterProperty::Discoverable(discoverable) => {
                    self.discoverable = discoverable;
                    outcome.status = true;
                }
                AdapterProperty::DiscoverableTimeout(timeout) => {
                    self.discoverable_timeout = timeout;
                    outcome.status = true;
                }
                AdapterProperty::DiscoveryTimeout(timeout) => {
                    self.discovery_timeout = timeout;
                    outcome.status = true;
                }
                AdapterProperty::Pairable(pairable) => {
                    // Pairable flipping off means the pairable timeout
                    // expired; an open incoming subscription has to go.
                    if self.pair_state.is_pairable() && !pairable {
                        self.cancel_incoming_pairing_subscription();
                    } else if self.io_capability != PairingIoCapability::NoInputNoOutput {
                        self.pair_state.set_pairable(pairable);
                    }
                    outcome.status = true;
                }
                AdapterProperty::PairableTimeout(timeout) => {
                    self.pair_state.set_pairable_timeout(timeout);
                    outcome.status = true;
                }
                AdapterProperty::ClassOfDevice(class) => {
                    self.class_of_device = class;
                    outcome.available = true;
                }
                AdapterProperty::Uuids(uuids) => {
                    self.uuids = uuids;
                    outcome.available = true;
                }
            }
        }
        outcome
    }

    /// Tears down the incoming pairing subscription after the pairable
    /// timeout expired.
    fn cancel_incoming_pairing_subscription(&mut self) {
        if !self.pair_state.is_pairable()
            || self.io_capability == PairingIoCapability::NoInputNoOutput
        {
            return;
        }
        debug!(adapter = %self.address, "pairable timeout reached, dropping incoming subscription");
        if let Some(watch) = self.incoming_pairing_watch.take() {
            watch.post(json!({
                "adapterAddress": self.address,
                "subscribed": false,
                "returnValue": false,
                "errorCode": ErrorCode::PairableTo.code(),
                "errorText": ErrorCode::PairableTo.text(),
            }));
        }
        self.pair_state.set_pairable(false);
        if self.pair_state.is_pairing() {
            self.stop_pairing();
        }
    }

    /// Takes the pairing slot and mirrors it into the inventory.
    pub(crate) fn start_pairing(&mut self, device: Address, direction: pair::PairingDirection) {
        self.pair_state.start_pairing(device, direction);
        if let Some(entry) = self.inventory.device_mut(&device) {
            entry.pairing = true;
        }
        self.notify_devices_subscribers();
        self.notify_filtered_subscribers();
        self.notify_root_status();
    }

    /// Releases the pairing slot and mirrors it into the inventory.
    pub(crate) fn stop_pairing(&mut self) {
        if let Some(device) = self.pair_state.device() {
            if let Some(entry) = self.inventory.device_mut(&device) {
                entry.pairing = false;
            }
        }
        self.pair_state.stop_pairing();
        self.notify_devices_subscribers();
        self.notify_filtered_subscribers();
        self.notify_root_status();
    }

    /// Defers a post to the root `getStatus` subscribers; the adapter
    /// cannot serialize the full adapter set while it is borrowed.
    pub(crate) fn notify_root_status(&self) {
        let _ = self.tx.send(Message::Resume(Box::new(|service: &mut Service| {
            service.core.notify_status_subscribers();
        }) as Resume));
    }

    fn devices_body(&self) -> Value {
        json!({
            "adapterAddress": self.address,
            "devices": self
                .inventory
                .devices()
                .map(Device::to_json)
                .collect::<Vec<_>>(),
            "returnValue": true,
        })
    }

    fn connected_devices_body(&self) -> Value {
        json!({
            "adapterAddress": self.address,
            "devices": self
                .inventory
                .devices()
                .filter(|device| device.connected)
                .map(Device::to_json)
                .collect::<Vec<_>>(),
            "returnValue": true,
        })
    }

    pub(crate) fn notify_devices_subscribers(&mut self) {
        let body = self.devices_body();
        self.devices_subscriptions.post(&body);
    }

    pub(crate) fn notify_connected_subscribers(&mut self) {
        let body = self.connected_devices_body();
        self.connected_subscriptions.post(&body);
    }

    pub(crate) fn notify_filtered_subscribers(&self) {
        for entry in self.filtered.values() {
            if let Some(watch) = &entry.watch {
                let devices: Vec<_> = self
                    .inventory
                    .filtered_devices(&entry.filter)
                    .iter()
                    .map(|device| device.to_json())
                    .collect();
                watch.post(json!({
                    "adapterAddress": self.address,
                    "devices": devices,
                    "returnValue": true,
                }));
            }
        }
    }

    pub(crate) fn notify_scan_subscribers(&mut self, scan_id: u32) {
        let Some(watch) = self.scan_watches.get(&scan_id) else {
            return;
        };
        let devices: Vec<_> = self
            .inventory
            .le_devices(scan_id)
            .map(Device::to_json)
            .collect();
        watch.post(json!({
            "adapterAddress": self.address,
            "devices": devices,
            "returnValue": true,
        }));
    }

    fn on_devices_changed(&mut self) {
        self.notify_devices_subscribers();
        self.notify_filtered_subscribers();
        self.notify_connected_subscribers();
    }
}

/// Applies a property change set and posts the resulting notifications.
pub(crate) fn apply_adapter_properties(
    service: &mut Service,
    adapter: Address,
    properties: Vec<AdapterProperty>,
) {
    let outcome = match service.core.adapter_mut(&adapter) {
        Some(manager) => manager.apply_properties(properties),
        None => return,
    };
    if outcome.status {
        service.core.notify_status_subscribers();
    }
    if outcome.available {
        service.core.notify_available_subscribers();
    }
}

/// Routes an adapter-scoped stack observation.
pub(crate) fn handle_stack_event(service: &mut Service, adapter: Address, event: AdapterEvent) {
    match event {
        AdapterEvent::StateChanged { powered } => {
            let changed = match service.core.adapter_mut(&adapter) {
                Some(manager) if manager.powered != powered => {
                    manager.powered = powered;
                    true
                }
                _ => false,
            };
            if changed {
                debug!(adapter = %adapter, powered, "adapter power state changed");
                service.core.notify_status_subscribers();
            }
        }
        AdapterEvent::PropertiesChanged(properties) => {
            apply_adapter_properties(service, adapter, properties);
        }
        AdapterEvent::DiscoveryStateChanged { active } => {
            let changed = match service.core.adapter_mut(&adapter) {
                Some(manager) if manager.discovering != active => {
                    manager.discovering = active;
                    true
                }
                _ => false,
            };
            if changed {
                service.core.notify_status_subscribers();
            }
        }
        AdapterEvent::DeviceFound { properties } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                if manager.inventory.device_found(properties).is_some() {
                    manager.on_devices_changed();
                }
            }
        }
        AdapterEvent::DevicePropertiesChanged {
            address,
            properties,
        } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                if manager.inventory.device_properties_changed(&address, properties) {
                    manager.on_devices_changed();
                }
            }
        }
        AdapterEvent::DeviceRemoved { address } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                if manager.inventory.device_removed(&address) {
                    manager.on_devices_changed();
                }
            }
        }
        AdapterEvent::LeDeviceFound {
            scan_id,
            properties,
        } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                if manager.inventory.le_device_found(scan_id, properties) {
                    manager.notify_scan_subscribers(scan_id);
                }
            }
        }
        AdapterEvent::LeDevicePropertiesChanged {
            scan_id,
            address,
            properties,
        } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                if manager
                    .inventory
                    .le_device_properties_changed(scan_id, &address, properties)
                {
                    manager.notify_scan_subscribers(scan_id);
                }
            }
        }
        AdapterEvent::LeDeviceRemoved { scan_id, address } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                if manager.inventory.le_device_removed(scan_id, &address) {
                    manager.notify_scan_subscribers(scan_id);
                }
            }
        }
        AdapterEvent::LinkKeyCreated { address, link_key } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                manager.inventory.link_key_created(address, link_key);
            }
        }
        AdapterEvent::LinkKeyDestroyed { address } => {
            if let Some(manager) = service.core.adapter_mut(&adapter) {
                manager.inventory.link_key_destroyed(&address);
            }
        }
        AdapterEvent::PairingSecretRequested {
            address,
            secret_type,
        } => pairing::on_secret_requested(service, adapter, address, secret_type),
        AdapterEvent::PairingPinCodeDisplayed { address, pin } => {
            pairing::on_pin_code_displayed(service, adapter, address, pin);
        }
        AdapterEvent::PairingPasskeyDisplayed { address, passkey } => {
            pairing::on_passkey_displayed(service, adapter, address, passkey);
        }
        AdapterEvent::PairingConfirmationRequested { address, passkey } => {
            pairing::on_confirmation_requested(service, adapter, address, passkey);
        }
        AdapterEvent::PairingCanceled => pairing::on_pairing_canceled(service, adapter),
        AdapterEvent::LeConnectionRequest { address, connected } => {
            debug!(adapter = %adapter, device = %address, connected, "le connection request");
        }
        AdapterEvent::KeepAliveStateChanged { enabled } => {
            debug!(adapter = %adapter, enabled, "keep-alive state changed");
        }
    }
}

/// Routes `/adapter`, `/device` and `/le` requests.
pub(crate) fn dispatch(service: &mut Service, request: BusRequest) {
    match (request.category(), request.method()) {
        ("/adapter", "setState") => set_state(service, request),
        ("/adapter", "getStatus") => get_status(service, request),
        ("/adapter", "queryAvailable") => query_available(service, request),
        ("/adapter" | "/adapter/internal", "startDiscovery") => start_discovery(service, request),
        ("/adapter", "cancelDiscovery") => cancel_discovery(service, request),
        ("/adapter", "pair") => pairing::pair(service, request),
        ("/adapter", "unpair") => pairing::unpair(service, request),
        ("/adapter", "supplyPasskey") => pairing::supply_passkey(service, request),
        ("/adapter", "supplyPinCode") => pairing::supply_pin_code(service, request),
        ("/adapter", "supplyPasskeyConfirmation") => {
            pairing::supply_passkey_confirmation(service, request);
        }
        ("/adapter", "cancelPairing") => pairing::cancel_pairing(service, request),
        ("/adapter", "awaitPairingRequests") => pairing::await_pairing_requests(service, request),
        ("/device", "getStatus") => device_get_status(service, request),
        ("/device", "setState") => device_set_state(service, request),
        ("/device", "getConnectedDevices") => get_connected_devices(service, request),
        ("/device", "getPairedDevices") => get_paired_devices(service, request),
        ("/device", "getDiscoveredDevice") => get_discovered_device(service, request),
        ("/adapter/internal", "setDisplayAssignment") => {
            crate::profile::set_display_assignment(service, request);
        }
        ("/device/internal", "getStatus") => filtered_get_status(service, request),
        ("/device/internal", "getLinkKey") => get_link_key(service, request),
        ("/le", "startScan") => le::start_scan(service, request),
        ("/le", "startAdvertising") => le::start_advertising(service, request),
        ("/le", "updateAdvertising") => le::update_advertising(service, request),
        ("/le", "disableAdvertising") => le::disable_advertising(service, request),
        ("/le", "getStatus") => le::get_status(service, request),
        _ => request.reply_error(ErrorCode::MsgParseFail),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SetStateParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    name: Option<String>,
    powered: Option<bool>,
    discovery_timeout: Option<i64>,
    discoverable: Option<bool>,
    discoverable_timeout: Option<i64>,
    pairable: Option<bool>,
    pairable_timeout: Option<i64>,
}

fn set_state(service: &mut Service, request: BusRequest) {
    let parsed: SetStateParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    if parsed.discovery_timeout.is_some_and(|timeout| timeout < 0) {
        return request.reply_error(ErrorCode::DiscoveryToNegValue);
    }
    if parsed
        .discoverable_timeout
        .is_some_and(|timeout| timeout < 0)
    {
        return request.reply_error(ErrorCode::DiscoverableToNegValue);
    }
    if parsed.pairable_timeout.is_some_and(|timeout| timeout < 0) {
        return request.reply_error(ErrorCode::PairableToNegValue);
    }

    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    let mut properties = Vec::new();
    if let Some(name) = parsed.name {
        if name != manager.name {
            properties.push(AdapterProperty::Name(name));
        }
    }
    if let Some(timeout) = parsed.discovery_timeout {
        let timeout = timeout as u32;
        if timeout != manager.discovery_timeout {
            properties.push(AdapterProperty::DiscoveryTimeout(timeout));
        }
    }
    if let Some(discoverable) = parsed.discoverable {
        if discoverable != manager.discoverable {
            properties.push(AdapterProperty::Discoverable(discoverable));
        }
    }
    if let Some(timeout) = parsed.discoverable_timeout {
        let timeout = timeout as u32;
        if timeout != manager.discoverable_timeout {
            properties.push(AdapterProperty::DiscoverableTimeout(timeout));
        }
    }
    if let Some(pairable) = parsed.pairable {
        if pairable != manager.pair_state.is_pairable() {
            properties.push(AdapterProperty::Pairable(pairable));
        }
    }
    if let Some(timeout) = parsed.pairable_timeout {
        let timeout = timeout as u32;
        if timeout != manager.pair_state.pairable_timeout() {
            properties.push(AdapterProperty::PairableTimeout(timeout));
        }
    }
    let power_change = parsed.powered.filter(|powered| *powered != manager.powered);

    if properties.is_empty() && power_change.is_none() {
        return request.reply_error(ErrorCode::NoPropChange);
    }

    let sil = manager.sil.clone();
    defer(
        &service.core.tx,
        async move {
            if let Some(powered) = power_change {
                let result = if powered { sil.enable().await } else { sil.disable().await };
                result.map_err(|_| ErrorCode::PowerStateChangeFail)?;
            }
            for property in properties {
                sil.set_adapter_property(property)
                    .await
                    .map_err(|_| ErrorCode::AdapterPropertyFail)?;
            }
            Ok::<(), ErrorCode>(())
        },
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
            })),
            Err(code) => request.reply_error(code),
        },
    );
}

fn get_status(service: &mut Service, request: BusRequest) {
    let subscribed = request.is_subscription();
    let body = json!({
        "adapters": service
            .core
            .adapters
            .values()
            .map(AdapterManager::status_json)
            .collect::<Vec<_>>(),
        "returnValue": true,
        "subscribed": subscribed,
    });
    request.reply(body);
    if subscribed {
        service.core.status_subscriptions.subscribe(request);
    }
}

fn query_available(service: &mut Service, request: BusRequest) {
    let subscribed = request.is_subscription();
    let body = json!({
        "adapters": service
            .core
            .adapters
            .values()
            .map(AdapterManager::available_json)
            .collect::<Vec<_>>(),
        "returnValue": true,
        "subscribed": subscribed,
    });
    request.reply(body);
    if subscribed {
        service.core.available_subscriptions.subscribe(request);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StartDiscoveryParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    class_of_device: Option<u32>,
    uuid: Option<String>,
}

fn start_discovery(service: &mut Service, request: BusRequest) {
    let parsed: StartDiscoveryParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    if !manager.powered {
        return request.reply_error(ErrorCode::StartDiscAdapterOffErr);
    }

    if parsed.class_of_device.is_some() || parsed.uuid.is_some() {
        let entry = manager
            .filtered
            .entry(request.sender().to_owned())
            .or_insert_with(|| FilteredEntry {
                filter: DeviceFilter::default(),
                watch: None,
            });
        entry.filter = DeviceFilter {
            class_of_device: parsed.class_of_device.unwrap_or(0),
            uuid: parsed.uuid.unwrap_or_default(),
        };
    }

    // Outgoing pairing performs cancelDiscovery then pair; a discovery
    // started in between would break that sequence, so it is ignored.
    if !manager.pair_state.is_pairing() && manager.sil.start_discovery().is_err() {
        return request.reply_error(ErrorCode::StartDiscFail);
    }

    request.reply(json!({
        "returnValue": true,
        "adapterAddress": adapter,
    }));
}

fn cancel_discovery(service: &mut Service, request: BusRequest) {
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    let sil = manager.sil.clone();
    let sender = request.sender().to_owned();
    defer(
        &service.core.tx,
        async move { sil.cancel_discovery().await },
        move |service, result| {
            match result {
                Ok(()) => {
                    request.reply(json!({
                        "returnValue": true,
                        "adapterAddress": adapter,
                    }));
                    // The caller is done discovering; its filtered
                    // device subscription goes with the discovery.
                    if let Some(manager) = service.core.adapter_mut(&adapter) {
                        manager.filtered.remove(&sender);
                    }
                }
                Err(_) => request.reply_error(ErrorCode::StopDiscFail),
            }
        },
    );
}

fn device_get_status(service: &mut Service, request: BusRequest) {
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    let subscribed = request.is_subscription();
    let mut body = manager.devices_body();
    if let Some(object) = body.as_object_mut() {
        object.insert("subscribed".into(), json!(subscribed));
    }
    request.reply(body);
    if subscribed {
        manager.devices_subscriptions.subscribe(request);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeviceSetStateParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    trusted: Option<bool>,
    blocked: Option<bool>,
}

fn device_set_state(service: &mut Service, request: BusRequest) {
    let parsed: DeviceSetStateParams =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    let device = parsed.address;
    let Some(entry) = manager.inventory.device(&device) else {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    };

    let mut properties = Vec::new();
    if let Some(trusted) = parsed.trusted {
        if trusted != entry.trusted {
            properties.push(DeviceProperty::Trusted(trusted));
        }
    }
    if let Some(blocked) = parsed.blocked {
        if blocked != entry.blocked {
            properties.push(DeviceProperty::Blocked(blocked));
        }
    }
    if properties.is_empty() {
        return request.reply_error(ErrorCode::NoPropChange);
    }

    let sil = manager.sil.clone();
    let applied = properties.clone();
    defer(
        &service.core.tx,
        async move { sil.set_device_properties(device, properties).await },
        move |service, result| match result {
            Ok(()) => {
                if let Some(manager) = service.core.adapter_mut(&adapter) {
                    if manager.inventory.device_properties_changed(&device, applied) {
                        manager.on_devices_changed();
                    }
                }
                request.reply(json!({
                    "returnValue": true,
                    "adapterAddress": adapter,
                    "address": device,
                }));
            }
            Err(_) => request.reply_error(ErrorCode::DevicePropertyFail),
        },
    );
}

fn get_connected_devices(service: &mut Service, request: BusRequest) {
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    let subscribed = request.is_subscription();
    let mut body = manager.connected_devices_body();
    if let Some(object) = body.as_object_mut() {
        object.insert("subscribed".into(), json!(subscribed));
    }
    request.reply(body);
    if subscribed {
        manager.connected_subscriptions.subscribe(request);
    }
}

fn get_paired_devices(service: &mut Service, request: BusRequest) {
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    request.reply(json!({
        "adapterAddress": adapter,
        "devices": manager
            .inventory
            .devices()
            .filter(|device| device.paired)
            .map(Device::to_json)
            .collect::<Vec<_>>(),
        "returnValue": true,
    }));
}

fn get_discovered_device(service: &mut Service, request: BusRequest) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Params {
        #[serde(rename = "adapterAddress")]
        _adapter_address: Option<String>,
        address: Address,
    }

    let parsed: Params =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    let Some(device) = manager.inventory.device(&parsed.address) else {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    };
    request.reply(json!({
        "adapterAddress": adapter,
        "device": device.to_json(),
        "returnValue": true,
    }));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FilteredStatusParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    class_of_device: Option<u32>,
    uuid: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

fn filtered_get_status(service: &mut Service, request: BusRequest) {
    if request.sender().is_empty() {
        return request.reply_error_subscribed(ErrorCode::MessageOwnerMissing);
    }
    let parsed: FilteredStatusParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter_mut(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };

    let sender = request.sender().to_owned();
    let filter = DeviceFilter {
        class_of_device: parsed.class_of_device.unwrap_or(0),
        uuid: parsed.uuid.unwrap_or_default(),
    };
    let subscribed = request.is_subscription();

    let devices: Vec<_> = manager
        .inventory
        .filtered_devices(&filter)
        .iter()
        .map(|device| device.to_json())
        .collect();

    let watch = if subscribed {
        let tx = manager.tx.clone();
        let gone_sender = sender.clone();
        let watch = ClientWatch::new(
            request,
            WatchContext::adapter(adapter),
            move || {
                let _ = tx.send(Message::Resume(Box::new(move |service: &mut Service| {
                    if let Some(manager) = service.core.adapter_mut(&adapter) {
                        manager.filtered.remove(&gone_sender);
                    }
                }) as Resume));
            },
        );
        watch.post(json!({
            "adapterAddress": adapter,
            "devices": devices,
            "returnValue": true,
            "subscribed": true,
        }));
        Some(watch)
    } else {
        request.reply(json!({
            "adapterAddress": adapter,
            "devices": devices,
            "returnValue": true,
            "subscribed": false,
        }));
        None
    };

    manager.filtered.insert(sender, FilteredEntry { filter, watch });
}

fn get_link_key(service: &mut Service, request: BusRequest) {
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Params {
        #[serde(rename = "adapterAddress")]
        _adapter_address: Option<String>,
        address: Address,
    }

    let parsed: Params =
        match params::parse(request.payload(), &[("address", ErrorCode::AddrParamMissing)]) {
            Ok(parsed) => parsed,
            Err(code) => return request.reply_error(code),
        };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(manager) = service.core.adapter(&adapter) else {
        return request.reply_error(ErrorCode::AdapterNotAvailable);
    };
    if manager.inventory.device(&parsed.address).is_none() {
        return request.reply_error(ErrorCode::DeviceNotAvail);
    }
    request.reply(json!({
        "returnValue": true,
        "adapterAddress": adapter,
        "address": parsed.address,
        "linkKey": manager.inventory.link_key(&parsed.address),
    }));
}
