//! Scripted in-memory SIL for integration tests.
//!
//! Every call succeeds immediately unless a failure was scripted with
//! [`FakeSil::fail_next`]. Calls are recorded as [`FakeCall`]s so tests
//! can assert what reached the stack, and observer events are injected
//! with [`FakeSil::emit`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use async_trait::async_trait;
use blued_common::Address;

use crate::events::{AdapterEvent, ProfileEvent, SilEvent};
use crate::types::{
    AdapterProperty, AdvertiseData, AdvertiserSettings, DeviceProperty, FolderItem,
    LeDiscoveryFilter, MediaMetaData, MediaPlayStatus, PairingSecret, PassThroughKeyCode,
    PassThroughKeyStatus, PlayerApplicationSetting, ProfileId,
};
use crate::{Sil, SilAdapter, SilAvrcp, SilError, SilEventSender, SilOpp, SilProfile, SilResult};

/// One recorded stack call.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum FakeCall {
    Enable(Address),
    Disable(Address),
    SetAdapterProperty(Address, AdapterProperty),
    SetDeviceProperties(Address, Address, Vec<DeviceProperty>),
    StartDiscovery(Address),
    CancelDiscovery(Address),
    StartLeDiscovery(Address),
    CancelLeDiscovery(Address),
    AddLeDiscoveryFilter(Address, u32),
    RemoveLeDiscoveryFilter(Address, u32),
    MatchLeDiscoveryFilterDevices(Address, u32),
    Pair(Address, Address),
    CancelPairing(Address, Address),
    Unpair(Address, Address),
    SupplyPairingSecret(Address, Address, PairingSecret),
    SupplyPairingConfirmation(Address, Address, bool),
    RegisterAdvertiser(Address, u8),
    StartAdvertising(Address, u8),
    SetAdvertiserData(Address, u8, bool),
    SetAdvertiserParameters(Address, u8),
    DisableAdvertiser(Address, u8),
    UnregisterAdvertiser(Address, u8),
    ProfileConnect(ProfileId, Address),
    ProfileDisconnect(ProfileId, Address),
    EnableRole(ProfileId, String),
    DisableRole(ProfileId, String),
    SupplyMediaMetaData(u64, MediaMetaData),
    SupplyMediaPlayStatus(u64, MediaPlayStatus),
    SendPassThroughCommand(Address, PassThroughKeyCode, PassThroughKeyStatus),
    SetAbsoluteVolume(Address, u8),
    SetPlayerApplicationSettings(Address, Vec<PlayerApplicationSetting>),
    NotifyMediaPlayStatus(Address, MediaPlayStatus),
    GetNumberOfItems(Address),
    GetFolderItems(Address, u32, u32),
    ChangePath(Address, String),
    PlayItem(Address, String),
    AddToNowPlaying(Address, String),
    Search(Address, String),
    PushFile(Address, PathBuf, u64),
    CancelTransfer(u64),
    SupplyTransferConfirmation(u64, bool),
}

#[derive(Default)]
struct FakeState {
    sink: Option<SilEventSender>,
    calls: Vec<FakeCall>,
    failures: HashMap<&'static str, SilError>,
    parked: HashMap<&'static str, Arc<Notify>>,
    connected: HashMap<(ProfileId, Address), bool>,
    number_of_items: u32,
    folder_items: Vec<FolderItem>,
    next_scan_id: u32,
    next_transfer_id: u64,
    next_advertiser_id: u8,
}

impl FakeState {
    fn take_failure(&mut self, op: &'static str) -> SilResult<()> {
        match self.failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Scripted stack with a configurable set of adapters.
#[derive(Clone)]
pub struct FakeSil {
    state: Arc<Mutex<FakeState>>,
    adapters: Vec<Arc<FakeAdapter>>,
}

impl FakeSil {
    /// Creates a fake stack exposing the given adapters; the first one
    /// is the default adapter.
    pub fn new(addresses: &[Address]) -> Self {
        let state = Arc::new(Mutex::new(FakeState {
            next_scan_id: 1,
            next_transfer_id: 1,
            next_advertiser_id: 1,
            ..FakeState::default()
        }));
        let adapters = addresses
            .iter()
            .enumerate()
            .map(|(index, address)| {
                Arc::new(FakeAdapter {
                    address: *address,
                    interface: format!("hci{index}"),
                    state: state.clone(),
                })
            })
            .collect();
        Self { state, adapters }
    }

    /// Injects a stack observation into the service.
    pub fn emit(&self, event: SilEvent) {
        let sink = self.locked().sink.clone();
        if let Some(sink) = sink {
            let _ = sink.send(event);
        }
    }

    /// Injects an adapter-scoped observation.
    pub fn emit_adapter(&self, adapter: Address, event: AdapterEvent) {
        self.emit(SilEvent::Adapter { adapter, event });
    }

    /// Injects a profile-scoped observation.
    pub fn emit_profile(&self, adapter: Address, profile: ProfileId, event: ProfileEvent) {
        self.emit(SilEvent::Profile {
            adapter,
            profile,
            event,
        });
    }

    /// Scripts the next call of `op` to fail with `error`.
    ///
    /// `op` is the trait method name, e.g. `"pair"` or `"push_file"`.
    pub fn fail_next(&self, op: &'static str, error: SilError) {
        self.locked().failures.insert(op, error);
    }

    /// Parks calls of `op` until [`Self::release`], so tests can drive
    /// events while the call is still in flight.
    pub fn park(&self, op: &'static str) {
        self.locked().parked.insert(op, Arc::new(Notify::new()));
    }

    /// Releases a call parked on `op`.
    ///
    /// Stores a permit, so releasing before the parked call reaches its
    /// wait point is fine.
    pub fn release(&self, op: &'static str) {
        if let Some(notify) = self.locked().parked.remove(op) {
            notify.notify_one();
        }
    }

    /// Sets what `is_connected` reports for a profile/device pair.
    pub fn set_profile_connected(&self, profile: ProfileId, device: Address, connected: bool) {
        self.locked().connected.insert((profile, device), connected);
    }

    /// Sets the browse item count returned by `get_number_of_items`.
    pub fn set_number_of_items(&self, count: u32) {
        self.locked().number_of_items = count;
    }

    /// Sets the listing returned by `get_folder_items`.
    pub fn set_folder_items(&self, items: Vec<FolderItem>) {
        self.locked().folder_items = items;
    }

    /// All calls recorded so far, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.locked().calls.clone()
    }

    /// Drains and returns the recorded calls.
    pub fn take_calls(&self) -> Vec<FakeCall> {
        std::mem::take(&mut self.locked().calls)
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Sil for FakeSil {
    fn register_observer(&self, sink: SilEventSender) {
        self.locked().sink = Some(sink);
    }

    fn adapters(&self) -> Vec<Arc<dyn SilAdapter>> {
        self.adapters
            .iter()
            .map(|adapter| adapter.clone() as Arc<dyn SilAdapter>)
            .collect()
    }

    fn default_adapter(&self) -> Option<Arc<dyn SilAdapter>> {
        self.adapters
            .first()
            .map(|adapter| adapter.clone() as Arc<dyn SilAdapter>)
    }
}

/// One scripted adapter.
pub struct FakeAdapter {
    address: Address,
    interface: String,
    state: Arc<Mutex<FakeState>>,
}

impl FakeAdapter {
    fn locked(&self) -> std::sync::MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: FakeCall) {
        self.locked().calls.push(call);
    }

    fn result(&self, op: &'static str) -> SilResult<()> {
        self.locked().take_failure(op)
    }

    async fn park_point(&self, op: &'static str) {
        let notify = self.locked().parked.get(op).cloned();
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }
}

#[async_trait]
impl SilAdapter for FakeAdapter {
    fn address(&self) -> Address {
        self.address
    }

    fn interface_name(&self) -> String {
        self.interface.clone()
    }

    async fn adapter_properties(&self) -> SilResult<Vec<AdapterProperty>> {
        Ok(vec![
            AdapterProperty::Address(self.address),
            AdapterProperty::Name(format!("fake-{}", self.interface)),
            AdapterProperty::InterfaceName(self.interface.clone()),
            AdapterProperty::StackName("fake".into()),
            AdapterProperty::StackVersion("1.0".into()),
            AdapterProperty::FirmwareVersion("fw-1".into()),
            AdapterProperty::ClassOfDevice(0x0c_02_5a),
            AdapterProperty::Uuids(
                ProfileId::ALL
                    .iter()
                    .flat_map(|profile| profile.uuids().iter().map(|uuid| (*uuid).to_owned()))
                    .collect(),
            ),
        ])
    }

    async fn set_adapter_property(&self, property: AdapterProperty) -> SilResult<()> {
        self.record(FakeCall::SetAdapterProperty(self.address, property));
        self.result("set_adapter_property")
    }

    async fn set_device_properties(
        &self,
        address: Address,
        properties: Vec<DeviceProperty>,
    ) -> SilResult<()> {
        self.record(FakeCall::SetDeviceProperties(
            self.address,
            address,
            properties,
        ));
        self.result("set_device_properties")
    }

    async fn enable(&self) -> SilResult<()> {
        self.record(FakeCall::Enable(self.address));
        self.result("enable")
    }

    async fn disable(&self) -> SilResult<()> {
        self.record(FakeCall::Disable(self.address));
        self.result("disable")
    }

    fn start_discovery(&self) -> SilResult<()> {
        self.record(FakeCall::StartDiscovery(self.address));
        self.result("start_discovery")
    }

    async fn cancel_discovery(&self) -> SilResult<()> {
        self.record(FakeCall::CancelDiscovery(self.address));
        self.park_point("cancel_discovery").await;
        self.result("cancel_discovery")
    }

    fn start_le_discovery(&self) -> SilResult<()> {
        self.record(FakeCall::StartLeDiscovery(self.address));
        self.result("start_le_discovery")
    }

    fn cancel_le_discovery(&self) -> SilResult<()> {
        self.record(FakeCall::CancelLeDiscovery(self.address));
        self.result("cancel_le_discovery")
    }

    fn add_le_discovery_filter(&self, _filter: LeDiscoveryFilter) -> SilResult<u32> {
        let mut state = self.locked();
        state.take_failure("add_le_discovery_filter")?;
        let scan_id = state.next_scan_id;
        state.next_scan_id += 1;
        state
            .calls
            .push(FakeCall::AddLeDiscoveryFilter(self.address, scan_id));
        Ok(scan_id)
    }

    fn remove_le_discovery_filter(&self, scan_id: u32) {
        self.record(FakeCall::RemoveLeDiscoveryFilter(self.address, scan_id));
    }

    fn match_le_discovery_filter_devices(&self, scan_id: u32) {
        self.record(FakeCall::MatchLeDiscoveryFilterDevices(
            self.address,
            scan_id,
        ));
    }

    async fn pair(&self, address: Address) -> SilResult<()> {
        self.record(FakeCall::Pair(self.address, address));
        self.park_point("pair").await;
        self.result("pair")
    }

    async fn cancel_pairing(&self, address: Address) -> SilResult<()> {
        self.record(FakeCall::CancelPairing(self.address, address));
        self.result("cancel_pairing")
    }

    async fn unpair(&self, address: Address) -> SilResult<()> {
        self.record(FakeCall::Unpair(self.address, address));
        self.result("unpair")
    }

    fn supply_pairing_secret(&self, address: Address, secret: PairingSecret) -> SilResult<()> {
        self.record(FakeCall::SupplyPairingSecret(self.address, address, secret));
        self.result("supply_pairing_secret")
    }

    fn supply_pairing_confirmation(&self, address: Address, accept: bool) -> SilResult<()> {
        self.record(FakeCall::SupplyPairingConfirmation(
            self.address,
            address,
            accept,
        ));
        self.result("supply_pairing_confirmation")
    }

    async fn register_advertiser(&self) -> SilResult<u8> {
        let mut state = self.locked();
        state.take_failure("register_advertiser")?;
        let advertiser_id = state.next_advertiser_id;
        state.next_advertiser_id += 1;
        state
            .calls
            .push(FakeCall::RegisterAdvertiser(self.address, advertiser_id));
        Ok(advertiser_id)
    }

    async fn start_advertising(
        &self,
        advertiser_id: u8,
        _settings: AdvertiserSettings,
        _advertise_data: AdvertiseData,
        _scan_response: AdvertiseData,
    ) -> SilResult<()> {
        self.record(FakeCall::StartAdvertising(self.address, advertiser_id));
        self.result("start_advertising")
    }

    async fn set_advertiser_data(
        &self,
        advertiser_id: u8,
        scan_response: bool,
        _data: AdvertiseData,
    ) -> SilResult<()> {
        self.record(FakeCall::SetAdvertiserData(
            self.address,
            advertiser_id,
            scan_response,
        ));
        self.result("set_advertiser_data")
    }

    async fn set_advertiser_parameters(
        &self,
        advertiser_id: u8,
        _settings: AdvertiserSettings,
    ) -> SilResult<()> {
        self.record(FakeCall::SetAdvertiserParameters(
            self.address,
            advertiser_id,
        ));
        self.result("set_advertiser_parameters")
    }

    async fn disable_advertiser(&self, advertiser_id: u8) -> SilResult<()> {
        self.record(FakeCall::DisableAdvertiser(self.address, advertiser_id));
        self.result("disable_advertiser")
    }

    async fn unregister_advertiser(&self, advertiser_id: u8) -> SilResult<()> {
        self.record(FakeCall::UnregisterAdvertiser(self.address, advertiser_id));
        self.result("unregister_advertiser")
    }

    fn profile(&self, profile: ProfileId) -> Option<Arc<dyn SilProfile>> {
        let this = FakeProfile {
            profile,
            state: self.state.clone(),
        };
        Some(Arc::new(this))
    }

    fn avrcp(&self) -> Option<Arc<dyn SilAvrcp>> {
        Some(Arc::new(FakeProfile {
            profile: ProfileId::Avrcp,
            state: self.state.clone(),
        }))
    }

    fn opp(&self) -> Option<Arc<dyn SilOpp>> {
        Some(Arc::new(FakeProfile {
            profile: ProfileId::Opp,
            state: self.state.clone(),
        }))
    }
}

/// Scripted profile backend shared by all profile traits.
pub struct FakeProfile {
    profile: ProfileId,
    state: Arc<Mutex<FakeState>>,
}

impl FakeProfile {
    fn locked(&self) -> std::sync::MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: FakeCall) {
        self.locked().calls.push(call);
    }

    fn result(&self, op: &'static str) -> SilResult<()> {
        self.locked().take_failure(op)
    }

    async fn park_point(&self, op: &'static str) {
        let notify = self.locked().parked.get(op).cloned();
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }
}

#[async_trait]
impl SilProfile for FakeProfile {
    async fn is_connected(&self, address: Address) -> SilResult<bool> {
        let mut state = self.locked();
        state.take_failure("is_connected")?;
        Ok(state
            .connected
            .get(&(self.profile, address))
            .copied()
            .unwrap_or(false))
    }

    async fn connect(&self, address: Address) -> SilResult<()> {
        self.record(FakeCall::ProfileConnect(self.profile, address));
        self.park_point("connect").await;
        self.result("connect")
    }

    async fn disconnect(&self, address: Address) -> SilResult<()> {
        self.record(FakeCall::ProfileDisconnect(self.profile, address));
        self.result("disconnect")
    }

    async fn enable_role(&self, uuid: &str) -> SilResult<()> {
        self.record(FakeCall::EnableRole(self.profile, uuid.to_owned()));
        self.result("enable_role")
    }

    async fn disable_role(&self, uuid: &str) -> SilResult<()> {
        self.record(FakeCall::DisableRole(self.profile, uuid.to_owned()));
        self.result("disable_role")
    }
}

#[async_trait]
impl SilAvrcp for FakeProfile {
    async fn supply_media_meta_data(
        &self,
        request_id: u64,
        meta_data: MediaMetaData,
    ) -> SilResult<()> {
        self.record(FakeCall::SupplyMediaMetaData(request_id, meta_data));
        self.result("supply_media_meta_data")
    }

    async fn supply_media_play_status(
        &self,
        request_id: u64,
        status: MediaPlayStatus,
    ) -> SilResult<()> {
        self.record(FakeCall::SupplyMediaPlayStatus(request_id, status));
        self.result("supply_media_play_status")
    }

    fn send_pass_through_command(
        &self,
        address: Address,
        key_code: PassThroughKeyCode,
        key_status: PassThroughKeyStatus,
    ) -> SilResult<()> {
        self.record(FakeCall::SendPassThroughCommand(
            address, key_code, key_status,
        ));
        self.result("send_pass_through_command")
    }

    async fn set_absolute_volume(&self, address: Address, volume: u8) -> SilResult<()> {
        self.record(FakeCall::SetAbsoluteVolume(address, volume));
        self.result("set_absolute_volume")
    }

    async fn set_player_application_settings(
        &self,
        address: Address,
        settings: Vec<PlayerApplicationSetting>,
    ) -> SilResult<()> {
        self.record(FakeCall::SetPlayerApplicationSettings(address, settings));
        self.result("set_player_application_settings")
    }

    async fn notify_media_play_status(
        &self,
        address: Address,
        status: MediaPlayStatus,
    ) -> SilResult<()> {
        self.record(FakeCall::NotifyMediaPlayStatus(address, status));
        self.result("notify_media_play_status")
    }

    async fn get_number_of_items(&self, address: Address) -> SilResult<u32> {
        let mut state = self.locked();
        state.take_failure("get_number_of_items")?;
        state.calls.push(FakeCall::GetNumberOfItems(address));
        Ok(state.number_of_items)
    }

    async fn get_folder_items(
        &self,
        address: Address,
        start: u32,
        end: u32,
    ) -> SilResult<Vec<FolderItem>> {
        let mut state = self.locked();
        state.take_failure("get_folder_items")?;
        state.calls.push(FakeCall::GetFolderItems(address, start, end));
        Ok(state.folder_items.clone())
    }

    async fn change_path(&self, address: Address, item_path: String) -> SilResult<()> {
        self.record(FakeCall::ChangePath(address, item_path));
        self.result("change_path")
    }

    async fn play_item(&self, address: Address, item_path: String) -> SilResult<()> {
        self.record(FakeCall::PlayItem(address, item_path));
        self.result("play_item")
    }

    async fn add_to_now_playing(&self, address: Address, item_path: String) -> SilResult<()> {
        self.record(FakeCall::AddToNowPlaying(address, item_path));
        self.result("add_to_now_playing")
    }

    async fn search(&self, address: Address, search_string: String) -> SilResult<String> {
        let mut state = self.locked();
        state.take_failure("search")?;
        state.calls.push(FakeCall::Search(address, search_string));
        Ok("/search".to_owned())
    }
}

#[async_trait]
impl SilOpp for FakeProfile {
    async fn push_file(&self, address: Address, source_file: PathBuf) -> SilResult<u64> {
        let mut state = self.locked();
        state.take_failure("push_file")?;
        let transfer_id = state.next_transfer_id;
        state.next_transfer_id += 1;
        state
            .calls
            .push(FakeCall::PushFile(address, source_file, transfer_id));
        Ok(transfer_id)
    }

    async fn cancel_transfer(&self, transfer_id: u64) -> SilResult<()> {
        self.record(FakeCall::CancelTransfer(transfer_id));
        self.result("cancel_transfer")
    }

    async fn supply_transfer_confirmation(&self, transfer_id: u64, accept: bool) -> SilResult<()> {
        self.record(FakeCall::SupplyTransferConfirmation(transfer_id, accept));
        self.result("supply_transfer_confirmation")
    }
}
