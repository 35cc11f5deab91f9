//! AVRCP: media request brokerage, pass-through control, absolute
//! volume, player settings mirroring and browsing.
//!
//! Remote metadata/play-status requests are brokered: the stack's
//! opaque request handle is paired with a freshly allocated 3-digit
//! request id, the id is announced on the per-adapter await
//! subscription, and the eventual `supplyMediaMetaData` /
//! `supplyMediaPlayStatus` resolves the id back to the stack handle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use blued_common::{Address, BusRequest, ClientWatch, ErrorCode, WatchContext, params};
use blued_sil::types::{
    AvrcpRole, Equalizer, MediaMetaData, MediaPlayStatus, PassThroughKeyCode,
    PassThroughKeyStatus, PlayerApplicationSetting, PlayerInfo, ProfileId, RemoteFeatures,
    Repeat, Scan, Shuffle,
};
use blued_sil::{AvrcpEvent, SilAdapter, SilAvrcp};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::profile::base::{self, ProfileBase};
use crate::profile::{allocate_request_id, watch_for, watches_for};
use crate::service::{Message, Resume, Service, defer, sil_error_body};

/// Converts a percentage volume to the 7-bit AVRCP scale.
pub(crate) fn volume_to_stack(percent: u8) -> u8 {
    ((f64::from(percent) / 100.0) * 127.0).round() as u8
}

/// Converts a 7-bit AVRCP volume back to a percentage.
pub(crate) fn volume_to_percent(stack: u8) -> u8 {
    ((f64::from(stack) / 127.0) * 100.0).round() as u8
}

/// One brokered media request.
#[derive(Debug)]
struct MediaRequest {
    adapter: Address,
    device: Address,
    request_id: String,
    stack_id: u64,
}

/// Which of the two brokered request kinds a method touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    MetaData,
    PlayStatus,
}

/// Mirror of the remote player application settings.
#[derive(Debug, Clone, Copy)]
struct PlayerSettings {
    equalizer: Equalizer,
    repeat: Repeat,
    shuffle: Shuffle,
    scan: Scan,
}

impl PlayerSettings {
    fn to_json_fields(self, body: &mut Value) {
        if let Some(object) = body.as_object_mut() {
            object.insert("equalizer".into(), json!(self.equalizer.as_str()));
            object.insert("repeat".into(), json!(self.repeat.as_str()));
            object.insert("shuffle".into(), json!(self.shuffle.as_str()));
            object.insert("scan".into(), json!(self.scan.as_str()));
        }
    }
}

/// The AVRCP profile service.
pub(crate) struct AvrcpProfile {
    pub(crate) base: ProfileBase,
    impls: HashMap<Address, Arc<dyn SilAvrcp>>,
    next_request_id: u16,
    request_index: u64,
    meta_data_requests: BTreeMap<u64, MediaRequest>,
    play_status_requests: BTreeMap<u64, MediaRequest>,
    incoming_meta_data_watches: Vec<ClientWatch>,
    incoming_play_status_watches: Vec<ClientWatch>,
    meta_data_watches: Vec<ClientWatch>,
    play_status_watches: Vec<ClientWatch>,
    settings_watches: Vec<ClientWatch>,
    pass_through_watches: Vec<ClientWatch>,
    volume_watches: Vec<ClientWatch>,
    adapter_volume_watches: Vec<ClientWatch>,
    player_info_watches: Vec<ClientWatch>,
    notification_events_watches: Vec<ClientWatch>,
    folder_watches: Vec<ClientWatch>,
    settings: PlayerSettings,
    remote_volumes: HashMap<(Address, Address), u8>,
    remote_features: HashMap<(Address, Address, AvrcpRole), RemoteFeatures>,
    player_info: HashMap<(Address, Address), Vec<PlayerInfo>>,
    current_folder: HashMap<(Address, Address), String>,
    play_status: HashMap<(Address, Address), MediaPlayStatus>,
    media_meta_data: Option<MediaMetaData>,
    supported_notification_events: Vec<u8>,
}

impl AvrcpProfile {
    pub(crate) fn new() -> Self {
        Self {
            base: ProfileBase::new(ProfileId::Avrcp),
            impls: HashMap::new(),
            next_request_id: 1,
            request_index: 0,
            meta_data_requests: BTreeMap::new(),
            play_status_requests: BTreeMap::new(),
            incoming_meta_data_watches: Vec::new(),
            incoming_play_status_watches: Vec::new(),
            meta_data_watches: Vec::new(),
            play_status_watches: Vec::new(),
            settings_watches: Vec::new(),
            pass_through_watches: Vec::new(),
            volume_watches: Vec::new(),
            adapter_volume_watches: Vec::new(),
            player_info_watches: Vec::new(),
            notification_events_watches: Vec::new(),
            folder_watches: Vec::new(),
            settings: PlayerSettings {
                equalizer: Equalizer::Off,
                repeat: Repeat::Off,
                shuffle: Shuffle::Off,
                scan: Scan::Off,
            },
            remote_volumes: HashMap::new(),
            remote_features: HashMap::new(),
            player_info: HashMap::new(),
            current_folder: HashMap::new(),
            play_status: HashMap::new(),
            media_meta_data: None,
            supported_notification_events: Vec::new(),
        }
    }

    pub(crate) fn initialize(&mut self, adapter: Address, sil: &dyn SilAdapter) {
        self.base.initialize(adapter, sil);
        if let Some(backend) = sil.avrcp() {
            self.impls.insert(adapter, backend);
        }
    }

    pub(crate) fn reset(&mut self, adapter: &Address) {
        self.base.reset(adapter);
        self.impls.remove(adapter);
        self.meta_data_requests.retain(|_, r| r.adapter != *adapter);
        self.play_status_requests.retain(|_, r| r.adapter != *adapter);
        let scoped = |watch: &ClientWatch| watch.context().adapter_address != Some(*adapter);
        self.incoming_meta_data_watches.retain(scoped);
        self.incoming_play_status_watches.retain(scoped);
        self.meta_data_watches.retain(scoped);
        self.play_status_watches.retain(scoped);
        self.settings_watches.retain(scoped);
        self.pass_through_watches.retain(scoped);
        self.volume_watches.retain(scoped);
        self.adapter_volume_watches.retain(scoped);
        self.player_info_watches.retain(scoped);
        self.notification_events_watches.retain(scoped);
        self.folder_watches.retain(scoped);
        self.remote_volumes.retain(|(a, _), _| a != adapter);
        self.remote_features.retain(|(a, _, _), _| a != adapter);
        self.player_info.retain(|(a, _), _| a != adapter);
        self.current_folder.retain(|(a, _), _| a != adapter);
        self.play_status.retain(|(a, _), _| a != adapter);
    }

    fn impl_for(&self, adapter: &Address) -> Option<Arc<dyn SilAvrcp>> {
        self.impls.get(adapter).cloned()
    }

    /// Drops watches whose clients have gone away.
    fn prune_watches(&mut self) {
        let alive = |watch: &ClientWatch| !watch.is_client_gone();
        self.incoming_meta_data_watches.retain(alive);
        self.incoming_play_status_watches.retain(alive);
        self.meta_data_watches.retain(alive);
        self.play_status_watches.retain(alive);
        self.settings_watches.retain(alive);
        self.pass_through_watches.retain(alive);
        self.volume_watches.retain(alive);
        self.adapter_volume_watches.retain(alive);
        self.player_info_watches.retain(alive);
        self.notification_events_watches.retain(alive);
        self.folder_watches.retain(alive);
    }

    fn requests_mut(&mut self, kind: RequestKind) -> &mut BTreeMap<u64, MediaRequest> {
        match kind {
            RequestKind::MetaData => &mut self.meta_data_requests,
            RequestKind::PlayStatus => &mut self.play_status_requests,
        }
    }

    fn find_request(
        &self,
        kind: RequestKind,
        adapter: Address,
        request_id: &str,
    ) -> Option<(u64, u64)> {
        let requests = match kind {
            RequestKind::MetaData => &self.meta_data_requests,
            RequestKind::PlayStatus => &self.play_status_requests,
        };
        requests
            .iter()
            .find(|(_, request)| request.adapter == adapter && request.request_id == request_id)
            .map(|(index, request)| (*index, request.stack_id))
    }
}

/// Creates a watch whose disappearance prunes the AVRCP watch lists.
fn pruning_watch(service: &Service, request: BusRequest, context: WatchContext) -> ClientWatch {
    let tx = service.core.tx.clone();
    ClientWatch::new(request, context, move || {
        let _ = tx.send(Message::Resume(Box::new(|service: &mut Service| {
            if let Some(avrcp) = service.profiles.avrcp.as_mut() {
                avrcp.prune_watches();
            }
        }) as Resume));
    })
}

/// Routes `/avrcp`, `/avrcp/internal` and `/avrcp/browse` requests.
pub(crate) fn dispatch(service: &mut Service, request: BusRequest) {
    if service.profiles.avrcp.is_none() {
        return request.reply_error(ErrorCode::ProfileUnavail);
    }
    match (request.category(), request.method()) {
        ("/avrcp", "connect") => base::handle_connect(service, ProfileId::Avrcp, request),
        ("/avrcp", "disconnect") => base::handle_disconnect(service, ProfileId::Avrcp, request),
        ("/avrcp", "getStatus") => base::handle_get_status(service, ProfileId::Avrcp, request),
        ("/avrcp", "awaitMediaMetaDataRequest") => {
            await_media_request(service, request, RequestKind::MetaData);
        }
        ("/avrcp", "awaitMediaPlayStatusRequest") => {
            await_media_request(service, request, RequestKind::PlayStatus);
        }
        ("/avrcp", "supplyMediaMetaData") => supply_media_meta_data(service, request),
        ("/avrcp", "supplyMediaPlayStatus") => supply_media_play_status(service, request),
        ("/avrcp", "sendPassThroughCommand") => send_pass_through_command(service, request),
        ("/avrcp", "receivePassThroughCommand") => receive_pass_through_command(service, request),
        ("/avrcp", "getMediaMetaData") => get_media_meta_data(service, request),
        ("/avrcp", "getMediaPlayStatus") => get_media_play_status(service, request),
        ("/avrcp", "getPlayerApplicationSettings") => {
            get_player_application_settings(service, request);
        }
        ("/avrcp", "setPlayerApplicationSettings") => {
            set_player_application_settings(service, request);
        }
        ("/avrcp", "setAbsoluteVolume") => set_absolute_volume(service, request),
        ("/avrcp", "getRemoteVolume") => get_remote_volume(service, request),
        ("/avrcp", "getPlayerInfo") => get_player_info(service, request),
        ("/avrcp", "notifyMediaPlayStatus") => notify_media_play_status(service, request),
        ("/avrcp/internal", "enable") => base::handle_enable(service, ProfileId::Avrcp, request),
        ("/avrcp/internal", "disable") => base::handle_disable(service, ProfileId::Avrcp, request),
        ("/avrcp/internal", "getSupportedNotificationEvents") => {
            get_supported_notification_events(service, request);
        }
        ("/avrcp/internal", "getRemoteFeatures") => get_remote_features(service, request),
        ("/avrcp/browse", "getCurrentFolder") => get_current_folder(service, request),
        ("/avrcp/browse", "getNumberOfItems") => get_number_of_items(service, request),
        ("/avrcp/browse", "getFolderItems") => get_folder_items(service, request),
        ("/avrcp/browse", "changePath") => change_path(service, request),
        ("/avrcp/browse", "playItem") => play_item(service, request),
        ("/avrcp/browse", "addToNowPlaying") => add_to_now_playing(service, request),
        ("/avrcp/browse", "search") => search(service, request),
        _ => request.reply_error(ErrorCode::MsgParseFail),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AwaitParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

/// Checks shared by both await methods: subscription required, adapter
/// available and powered.
fn prepare_await(service: &mut Service, request: &BusRequest) -> Option<Address> {
    if params::parse::<AwaitParams>(request.payload(), &[])
        .map_err(|code| request.reply_error(code))
        .is_err()
    {
        return None;
    }
    if !request.is_subscription() {
        request.reply_error(ErrorCode::MthdNotSubscribed);
        return None;
    }
    let adapter = service.core.resolve_adapter(request)?;
    let powered = service
        .core
        .adapter(&adapter)
        .map(|manager| manager.powered)
        .unwrap_or(false);
    if !powered {
        request.reply_error(ErrorCode::AdapterTurnedOff);
        return None;
    }
    Some(adapter)
}

fn await_media_request(service: &mut Service, request: BusRequest, kind: RequestKind) {
    let Some(adapter) = prepare_await(service, &request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let watches = match kind {
        RequestKind::MetaData => &avrcp.incoming_meta_data_watches,
        RequestKind::PlayStatus => &avrcp.incoming_play_status_watches,
    };
    if watch_for(watches, adapter).is_some() {
        return request.reply_error(ErrorCode::AllowOneSubscribe);
    }

    let watch = pruning_watch(service, request, WatchContext::adapter(adapter));
    watch.post(json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
    }));
    let Some(avrcp) = service.profiles.avrcp.as_mut() else {
        return;
    };
    match kind {
        RequestKind::MetaData => avrcp.incoming_meta_data_watches.push(watch),
        RequestKind::PlayStatus => avrcp.incoming_play_status_watches.push(watch),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SupplyMetaDataParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    request_id: String,
    meta_data: MediaMetaData,
}

fn supply_media_meta_data(service: &mut Service, request: BusRequest) {
    let parsed: SupplyMetaDataParams = match params::parse(
        request.payload(),
        &[("requestId", ErrorCode::AvrcpRequestIdParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_mut() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some(backend) = avrcp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some((index, stack_id)) =
        avrcp.find_request(RequestKind::MetaData, adapter, &parsed.request_id)
    else {
        return request.reply_error(ErrorCode::AvrcpRequestIdNotExist);
    };

    avrcp.requests_mut(RequestKind::MetaData).remove(&index);
    let request_id = parsed.request_id;
    let meta_data = parsed.meta_data;
    defer(
        &service.core.tx,
        async move { backend.supply_media_meta_data(stack_id, meta_data).await },
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "requestId": request_id,
            })),
            Err(_) => request.reply_error(ErrorCode::AvrcpStateErr),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SupplyPlayStatusParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    request_id: String,
    playback_status: MediaPlayStatus,
}

fn supply_media_play_status(service: &mut Service, request: BusRequest) {
    let parsed: SupplyPlayStatusParams = match params::parse(
        request.payload(),
        &[
            ("requestId", ErrorCode::AvrcpRequestIdParamMissing),
            ("playbackStatus", ErrorCode::AvrcpPlaybackStatusParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_mut() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if watch_for(&avrcp.incoming_play_status_watches, adapter).is_none() {
        return request.reply_error(ErrorCode::AvrcpRequestNotAllowed);
    }
    let Some(backend) = avrcp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let Some((index, stack_id)) =
        avrcp.find_request(RequestKind::PlayStatus, adapter, &parsed.request_id)
    else {
        return request.reply_error(ErrorCode::AvrcpRequestIdNotExist);
    };

    avrcp.requests_mut(RequestKind::PlayStatus).remove(&index);
    let request_id = parsed.request_id;
    let status = parsed.playback_status;
    defer(
        &service.core.tx,
        async move { backend.supply_media_play_status(stack_id, status).await },
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "requestId": request_id,
            })),
            Err(_) => request.reply_error(ErrorCode::AvrcpStateErr),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PassThroughParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    key_code: String,
    key_status: String,
}

fn send_pass_through_command(service: &mut Service, request: BusRequest) {
    let parsed: PassThroughParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AvrcpDeviceAddressParamMissing),
            ("keyCode", ErrorCode::AvrcpKeyCodeParamMissing),
            ("keyStatus", ErrorCode::AvrcpKeyStatusParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let device = parsed.address;
    if !avrcp.base.is_connected(adapter, device) {
        return request.reply_error(ErrorCode::ProfileNotConnected);
    }

    let key_code = PassThroughKeyCode::parse(&parsed.key_code);
    if key_code == PassThroughKeyCode::Unknown {
        return request.reply_error(ErrorCode::AvrcpKeyCodeInvalidValueParam);
    }
    let key_status = PassThroughKeyStatus::parse(&parsed.key_status);
    if key_status == PassThroughKeyStatus::Unknown {
        return request.reply_error(ErrorCode::AvrcpKeyCodeInvalidValueParam);
    }

    let Some(backend) = avrcp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    if backend
        .send_pass_through_command(device, key_code, key_status)
        .is_err()
    {
        return request.reply_error(ErrorCode::AvrcpSendPassThroughCommandFailed);
    }
    request.reply(json!({
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
    }));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeviceSubscriptionParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

/// Checks shared by the per-device subscription methods.
fn prepare_device_subscription(
    service: &mut Service,
    request: &BusRequest,
) -> Option<(Address, Address)> {
    let parsed: DeviceSubscriptionParams = match params::parse(
        request.payload(),
        &[("address", ErrorCode::AvrcpDeviceAddressParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => {
            request.reply_error(code);
            return None;
        }
    };
    if !request.is_subscription() {
        request.reply_error(ErrorCode::MthdNotSubscribed);
        return None;
    }
    let adapter = service.core.resolve_adapter(request)?;
    let connected = service
        .profiles
        .avrcp
        .as_ref()
        .is_some_and(|avrcp| avrcp.base.is_connected(adapter, parsed.address));
    if !connected {
        request.reply_error(ErrorCode::ProfileNotConnected);
        return None;
    }
    Some((adapter, parsed.address))
}

fn receive_pass_through_command(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
    }));
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.pass_through_watches.push(watch);
    }
}

fn get_media_meta_data(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let cached = service
        .profiles
        .avrcp
        .as_ref()
        .and_then(|avrcp| avrcp.media_meta_data.clone());
    let mut body = json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
    });
    if let (Some(meta_data), Some(object)) = (cached, body.as_object_mut()) {
        object.insert("metaData".into(), json!(meta_data));
    }
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(body);
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.meta_data_watches.push(watch);
    }
}

fn get_media_play_status(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let cached = service
        .profiles
        .avrcp
        .as_ref()
        .and_then(|avrcp| avrcp.play_status.get(&(adapter, device)).cloned());
    let mut body = json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
    });
    if let (Some(status), Some(object)) = (cached, body.as_object_mut()) {
        object.insert("playbackStatus".into(), json!(status));
    }
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(body);
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.play_status_watches.push(watch);
    }
}

fn get_player_application_settings(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let settings = service
        .profiles
        .avrcp
        .as_ref()
        .map(|avrcp| avrcp.settings);
    let mut body = json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
    });
    if let Some(settings) = settings {
        settings.to_json_fields(&mut body);
    }
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(body);
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.settings_watches.push(watch);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SetSettingsParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Option<Address>,
    equalizer: Option<String>,
    repeat: Option<String>,
    shuffle: Option<String>,
    scan: Option<String>,
}

fn set_player_application_settings(service: &mut Service, request: BusRequest) {
    let parsed: SetSettingsParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let device = parsed.address;
    if let Some(device) = device {
        if !avrcp.base.is_connected(adapter, device) {
            return request.reply_error(ErrorCode::ProfileNotConnected);
        }
    }
    let Some(backend) = avrcp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    // Only deltas against the mirrored settings reach the stack.
    let mut changes = Vec::new();
    if let Some(value) = &parsed.equalizer {
        let equalizer = Equalizer::parse(value);
        if equalizer == Equalizer::Unknown {
            return request.reply_error(ErrorCode::AvrcpEqualizerInvalidValueParam);
        }
        if equalizer != avrcp.settings.equalizer {
            changes.push(PlayerApplicationSetting::Equalizer(equalizer));
        }
    }
    if let Some(value) = &parsed.repeat {
        let repeat = Repeat::parse(value);
        if repeat == Repeat::Unknown {
            return request.reply_error(ErrorCode::AvrcpRepeatInvalidValueParam);
        }
        if repeat != avrcp.settings.repeat {
            changes.push(PlayerApplicationSetting::Repeat(repeat));
        }
    }
    if let Some(value) = &parsed.shuffle {
        let shuffle = Shuffle::parse(value);
        if shuffle == Shuffle::Unknown {
            return request.reply_error(ErrorCode::AvrcpShuffleInvalidValueParam);
        }
        if shuffle != avrcp.settings.shuffle {
            changes.push(PlayerApplicationSetting::Shuffle(shuffle));
        }
    }
    if let Some(value) = &parsed.scan {
        let scan = Scan::parse(value);
        if scan == Scan::Unknown {
            return request.reply_error(ErrorCode::AvrcpScanInvalidValueParam);
        }
        if scan != avrcp.settings.scan {
            changes.push(PlayerApplicationSetting::Scan(scan));
        }
    }

    let mut ok_body = json!({
        "returnValue": true,
        "adapterAddress": adapter,
    });
    if let (Some(device), Some(object)) = (device, ok_body.as_object_mut()) {
        object.insert("address".into(), json!(device));
    }

    if changes.is_empty() {
        return request.reply(ok_body);
    }

    let target = device.unwrap_or(adapter);
    defer(
        &service.core.tx,
        async move {
            backend
                .set_player_application_settings(target, changes)
                .await
        },
        move |_service, result| match result {
            Ok(()) => request.reply(ok_body),
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SetVolumeParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    volume: i64,
}

fn set_absolute_volume(service: &mut Service, request: BusRequest) {
    let parsed: SetVolumeParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AvrcpDeviceAddressParamMissing),
            ("volume", ErrorCode::AvrcpVolumeParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    if !(0..=100).contains(&parsed.volume) {
        return request.reply_error(ErrorCode::AvrcpVolumeInvalidValueParam);
    }
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let device = parsed.address;
    if !avrcp.base.is_connected(adapter, device) {
        return request.reply_error(ErrorCode::ProfileNotConnected);
    }
    let Some(backend) = avrcp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    let stack_volume = volume_to_stack(parsed.volume as u8);
    defer(
        &service.core.tx,
        async move { backend.set_absolute_volume(device, stack_volume).await },
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
            })),
            Err(_) => request.reply_error(ErrorCode::AvrcpSetAbsoluteVolumeFailed),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GetVolumeParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Option<Address>,
    #[serde(rename = "subscribe")]
    _subscribe: Option<bool>,
}

fn get_remote_volume(service: &mut Service, request: BusRequest) {
    let parsed: GetVolumeParams = match params::parse(request.payload(), &[]) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    if !request.is_subscription() {
        return request.reply_error(ErrorCode::MthdNotSubscribed);
    }
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    let mut body = json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
    });
    let context = match parsed.address {
        Some(device) => {
            if let (Some(volume), Some(object)) = (
                avrcp.remote_volumes.get(&(adapter, device)),
                body.as_object_mut(),
            ) {
                object.insert("volume".into(), json!(volume));
            }
            if let Some(object) = body.as_object_mut() {
                object.insert("address".into(), json!(device));
            }
            WatchContext::device(adapter, device)
        }
        None => WatchContext::adapter(adapter),
    };

    let device_scoped = parsed.address.is_some();
    let watch = pruning_watch(service, request, context);
    watch.post(body);
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        if device_scoped {
            avrcp.volume_watches.push(watch);
        } else {
            avrcp.adapter_volume_watches.push(watch);
        }
    }
}

fn get_player_info(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let players = service
        .profiles
        .avrcp
        .as_ref()
        .and_then(|avrcp| avrcp.player_info.get(&(adapter, device)).cloned());
    let mut body = json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
    });
    if let (Some(players), Some(object)) = (players, body.as_object_mut()) {
        object.insert("players".into(), json!(players));
    }
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(body);
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.player_info_watches.push(watch);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NotifyPlayStatusParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    playback_status: MediaPlayStatus,
}

fn notify_media_play_status(service: &mut Service, request: BusRequest) {
    let parsed: NotifyPlayStatusParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AvrcpDeviceAddressParamMissing),
            ("playbackStatus", ErrorCode::AvrcpPlaybackStatusParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };
    let device = parsed.address;
    if !avrcp.base.is_connected(adapter, device) {
        return request.reply_error(ErrorCode::ProfileNotConnected);
    }
    let Some(backend) = avrcp.impl_for(&adapter) else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    let status = parsed.playback_status;
    defer(
        &service.core.tx,
        async move { backend.notify_media_play_status(device, status).await },
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
            })),
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

fn get_supported_notification_events(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let events = service
        .profiles
        .avrcp
        .as_ref()
        .map(|avrcp| avrcp.supported_notification_events.clone())
        .unwrap_or_default();
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
        "supportedNotificationEvents": events,
    }));
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.notification_events_watches.push(watch);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RemoteFeaturesParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    role: Option<String>,
}

fn get_remote_features(service: &mut Service, request: BusRequest) {
    let parsed: RemoteFeaturesParams = match params::parse(
        request.payload(),
        &[("address", ErrorCode::AvrcpDeviceAddressParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let Some(adapter) = service.core.resolve_adapter(&request) else {
        return;
    };
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        return request.reply_error(ErrorCode::ProfileUnavail);
    };

    let role = match parsed.role.as_deref() {
        None | Some("CT") => AvrcpRole::Controller,
        Some("TG") => AvrcpRole::Target,
        Some(_) => return request.reply_error(ErrorCode::SchemaValidationFail),
    };
    let features = avrcp
        .remote_features
        .get(&(adapter, parsed.address, role))
        .copied()
        .unwrap_or(RemoteFeatures::None);
    request.reply(json!({
        "returnValue": true,
        "adapterAddress": adapter,
        "address": parsed.address,
        "role": role.as_str(),
        "remoteFeatures": features.as_str(),
    }));
}

fn get_current_folder(service: &mut Service, request: BusRequest) {
    let Some((adapter, device)) = prepare_device_subscription(service, &request) else {
        return;
    };
    let folder = service
        .profiles
        .avrcp
        .as_ref()
        .and_then(|avrcp| avrcp.current_folder.get(&(adapter, device)).cloned())
        .unwrap_or_else(|| "/".to_owned());
    let watch = pruning_watch(service, request, WatchContext::device(adapter, device));
    watch.post(json!({
        "subscribed": true,
        "returnValue": true,
        "adapterAddress": adapter,
        "address": device,
        "folderPath": folder,
    }));
    if let Some(avrcp) = service.profiles.avrcp.as_mut() {
        avrcp.folder_watches.push(watch);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BrowseDeviceParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
}

/// Checks shared by the one-shot browse methods.
fn prepare_browse(
    service: &mut Service,
    request: &BusRequest,
    device: Address,
) -> Option<(Address, Arc<dyn SilAvrcp>)> {
    let adapter = service.core.resolve_adapter(request)?;
    let Some(avrcp) = service.profiles.avrcp.as_ref() else {
        request.reply_error(ErrorCode::ProfileUnavail);
        return None;
    };
    if !avrcp.base.is_connected(adapter, device) {
        request.reply_error(ErrorCode::ProfileNotConnected);
        return None;
    }
    let Some(backend) = avrcp.impl_for(&adapter) else {
        request.reply_error(ErrorCode::ProfileUnavail);
        return None;
    };
    Some((adapter, backend))
}

fn get_number_of_items(service: &mut Service, request: BusRequest) {
    let parsed: BrowseDeviceParams = match params::parse(
        request.payload(),
        &[("address", ErrorCode::AvrcpDeviceAddressParamMissing)],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let device = parsed.address;
    let Some((adapter, backend)) = prepare_browse(service, &request, device) else {
        return;
    };
    defer(
        &service.core.tx,
        async move { backend.get_number_of_items(device).await },
        move |_service, result| match result {
            Ok(count) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
                "numberOfItems": count,
            })),
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FolderItemsParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    start_index: u32,
    end_index: u32,
}

fn get_folder_items(service: &mut Service, request: BusRequest) {
    let parsed: FolderItemsParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AvrcpDeviceAddressParamMissing),
            ("startIndex", ErrorCode::AvrcpStartIndexParamMissing),
            ("endIndex", ErrorCode::AvrcpEndIndexParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let device = parsed.address;
    let Some((adapter, backend)) = prepare_browse(service, &request, device) else {
        return;
    };
    let (start, end) = (parsed.start_index, parsed.end_index);
    defer(
        &service.core.tx,
        async move { backend.get_folder_items(device, start, end).await },
        move |_service, result| match result {
            Ok(items) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
                "folderItems": items,
            })),
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ItemPathParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    item_path: String,
}

fn browse_item_call(
    service: &mut Service,
    request: BusRequest,
    call: fn(
        Arc<dyn SilAvrcp>,
        Address,
        String,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), blued_sil::SilError>> + Send>,
    >,
) {
    let parsed: ItemPathParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AvrcpDeviceAddressParamMissing),
            ("itemPath", ErrorCode::AvrcpItemPathParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let device = parsed.address;
    let Some((adapter, backend)) = prepare_browse(service, &request, device) else {
        return;
    };
    defer(
        &service.core.tx,
        call(backend, device, parsed.item_path),
        move |_service, result| match result {
            Ok(()) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
            })),
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

fn change_path(service: &mut Service, request: BusRequest) {
    browse_item_call(service, request, |backend, device, path| {
        Box::pin(async move { backend.change_path(device, path).await })
    });
}

fn play_item(service: &mut Service, request: BusRequest) {
    browse_item_call(service, request, |backend, device, path| {
        Box::pin(async move { backend.play_item(device, path).await })
    });
}

fn add_to_now_playing(service: &mut Service, request: BusRequest) {
    browse_item_call(service, request, |backend, device, path| {
        Box::pin(async move { backend.add_to_now_playing(device, path).await })
    });
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchParams {
    #[serde(rename = "adapterAddress")]
    _adapter_address: Option<String>,
    address: Address,
    search_string: String,
}

fn search(service: &mut Service, request: BusRequest) {
    let parsed: SearchParams = match params::parse(
        request.payload(),
        &[
            ("address", ErrorCode::AvrcpDeviceAddressParamMissing),
            ("searchString", ErrorCode::AvrcpSearchStringParamMissing),
        ],
    ) {
        Ok(parsed) => parsed,
        Err(code) => return request.reply_error(code),
    };
    let device = parsed.address;
    let Some((adapter, backend)) = prepare_browse(service, &request, device) else {
        return;
    };
    let needle = parsed.search_string;
    defer(
        &service.core.tx,
        async move { backend.search(device, needle).await },
        move |_service, result| match result {
            Ok(folder) => request.reply(json!({
                "returnValue": true,
                "adapterAddress": adapter,
                "address": device,
                "searchResult": folder,
            })),
            Err(error) => request.reply(sil_error_body(&adapter, error)),
        },
    );
}

/// Clears the per-device mirrors when the profile link drops.
pub(crate) fn on_disconnected(service: &mut Service, adapter: Address, device: Address) {
    let Some(avrcp) = service.profiles.avrcp.as_mut() else {
        return;
    };
    avrcp.remote_volumes.remove(&(adapter, device));
    avrcp
        .remote_features
        .remove(&(adapter, device, AvrcpRole::Controller));
    avrcp
        .remote_features
        .remove(&(adapter, device, AvrcpRole::Target));
    avrcp.player_info.remove(&(adapter, device));
    avrcp.current_folder.remove(&(adapter, device));
    avrcp.play_status.remove(&(adapter, device));
}

/// Routes an AVRCP stack observation.
pub(crate) fn on_event(service: &mut Service, adapter: Address, event: AvrcpEvent) {
    let Some(avrcp) = service.profiles.avrcp.as_mut() else {
        return;
    };
    match event {
        AvrcpEvent::MediaMetaDataRequested { request_id, device } => {
            create_media_request(avrcp, RequestKind::MetaData, adapter, device, request_id);
        }
        AvrcpEvent::MediaPlayStatusRequested { request_id, device } => {
            create_media_request(avrcp, RequestKind::PlayStatus, adapter, device, request_id);
        }
        AvrcpEvent::MediaMetaDataReceived { device, meta_data } => {
            avrcp.media_meta_data = Some(meta_data.clone());
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "metaData": meta_data,
            });
            for watch in watches_for(&avrcp.meta_data_watches, adapter, device) {
                watch.post(body.clone());
            }
        }
        AvrcpEvent::MediaPlayStatusReceived { device, status } => {
            avrcp.play_status.insert((adapter, device), status.clone());
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "playbackStatus": status,
            });
            for watch in watches_for(&avrcp.play_status_watches, adapter, device) {
                watch.post(body.clone());
            }
        }
        AvrcpEvent::PassThroughCommandReceived {
            device,
            key_code,
            key_status,
        } => {
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "keyCode": key_code.as_str(),
                "keyStatus": key_status.as_str(),
            });
            for watch in watches_for(&avrcp.pass_through_watches, adapter, device) {
                watch.post(body.clone());
            }
        }
        AvrcpEvent::VolumeChanged { device, volume } => {
            let percent = volume_to_percent(volume);
            avrcp.remote_volumes.insert((adapter, device), percent);
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "volume": percent,
            });
            for watch in watches_for(&avrcp.volume_watches, adapter, device) {
                watch.post(body.clone());
            }
            for watch in &avrcp.adapter_volume_watches {
                if watch.context().adapter_address == Some(adapter) {
                    watch.post(body.clone());
                }
            }
        }
        AvrcpEvent::PlayerApplicationSettingsReceived { device, settings } => {
            let mut changed = false;
            for setting in settings {
                match setting {
                    PlayerApplicationSetting::Equalizer(value) => {
                        changed |= avrcp.settings.equalizer != value;
                        avrcp.settings.equalizer = value;
                    }
                    PlayerApplicationSetting::Repeat(value) => {
                        changed |= avrcp.settings.repeat != value;
                        avrcp.settings.repeat = value;
                    }
                    PlayerApplicationSetting::Shuffle(value) => {
                        changed |= avrcp.settings.shuffle != value;
                        avrcp.settings.shuffle = value;
                    }
                    PlayerApplicationSetting::Scan(value) => {
                        changed |= avrcp.settings.scan != value;
                        avrcp.settings.scan = value;
                    }
                }
            }
            if changed {
                let mut body = json!({
                    "subscribed": true,
                    "returnValue": true,
                    "adapterAddress": adapter,
                    "address": device,
                });
                avrcp.settings.to_json_fields(&mut body);
                for watch in watches_for(&avrcp.settings_watches, adapter, device) {
                    watch.post(body.clone());
                }
            }
        }
        AvrcpEvent::RemoteFeaturesReceived {
            device,
            role,
            features,
        } => {
            avrcp.remote_features.insert((adapter, device, role), features);
        }
        AvrcpEvent::SupportedNotificationEventsReceived { device, events } => {
            avrcp.supported_notification_events = events.clone();
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "supportedNotificationEvents": events,
            });
            for watch in watches_for(&avrcp.notification_events_watches, adapter, device) {
                watch.post(body.clone());
            }
        }
        AvrcpEvent::PlayerInfoReceived { device, players } => {
            avrcp.player_info.insert((adapter, device), players.clone());
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "players": players,
            });
            for watch in watches_for(&avrcp.player_info_watches, adapter, device) {
                watch.post(body.clone());
            }
        }
        AvrcpEvent::CurrentFolderReceived { device, folder } => {
            avrcp
                .current_folder
                .insert((adapter, device), folder.clone());
            let body = json!({
                "returnValue": true,
                "subscribed": true,
                "address": device,
                "adapterAddress": adapter,
                "folderPath": folder,
            });
            for watch in watches_for(&avrcp.folder_watches, adapter, device) {
                watch.post(body.clone());
            }
        }
    }
}

/// Brokers a media request from the remote controller: allocate a
/// request id, remember the stack handle and announce the id on the
/// adapter's await subscription.
fn create_media_request(
    avrcp: &mut AvrcpProfile,
    kind: RequestKind,
    adapter: Address,
    device: Address,
    stack_id: u64,
) {
    let watches = match kind {
        RequestKind::MetaData => &avrcp.incoming_meta_data_watches,
        RequestKind::PlayStatus => &avrcp.incoming_play_status_watches,
    };
    if watch_for(watches, adapter).is_none() {
        debug!(?kind, device = %device, "media request without a listener");
        return;
    }

    let mut next = avrcp.next_request_id;
    let request_id = allocate_request_id(&mut next, avrcp.requests_mut(kind), |request| {
        request.request_id.as_str()
    });
    avrcp.next_request_id = next;

    let index = avrcp.request_index;
    avrcp.request_index += 1;
    avrcp.requests_mut(kind).insert(
        index,
        MediaRequest {
            adapter,
            device,
            request_id: request_id.clone(),
            stack_id,
        },
    );

    let watches = match kind {
        RequestKind::MetaData => &avrcp.incoming_meta_data_watches,
        RequestKind::PlayStatus => &avrcp.incoming_play_status_watches,
    };
    if let Some(watch) = watch_for(watches, adapter) {
        watch.post(json!({
            "returnValue": true,
            "subscribed": true,
            "address": device,
            "adapterAddress": adapter,
            "requestId": request_id,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_scales_to_seven_bits() {
        assert_eq!(volume_to_stack(0), 0);
        assert_eq!(volume_to_stack(50), 64);
        assert_eq!(volume_to_stack(100), 127);
        assert_eq!(volume_to_percent(64), 50);
        assert_eq!(volume_to_percent(127), 100);
    }

    #[test]
    fn volume_round_trip_is_lossless() {
        // 127 steps oversample the 101 percent values, so with
        // round-half-away-from-zero the tie-break exception set is
        // empty: every percentage survives the round trip.
        for percent in 0..=100u8 {
            assert_eq!(volume_to_percent(volume_to_stack(percent)), percent);
        }
    }
}
