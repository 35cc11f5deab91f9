//! Observer events flowing from the stack into the service dispatcher.

use blued_common::Address;

use crate::types::{
    AdapterProperty, DeviceProperty, MediaMetaData, MediaPlayStatus, PairingSecretType,
    PassThroughKeyCode, PassThroughKeyStatus, PlayerApplicationSetting, PlayerInfo, ProfileId,
    RemoteFeatures,
};
use crate::AvrcpRole;

/// Top-level stack event.
#[derive(Debug)]
pub enum SilEvent {
    /// The set of adapters known to the stack changed.
    AdaptersChanged,
    /// An adapter-scoped observation.
    Adapter {
        /// Adapter the event belongs to.
        adapter: Address,
        /// The observation itself.
        event: AdapterEvent,
    },
    /// A profile-scoped observation.
    Profile {
        /// Adapter the event belongs to.
        adapter: Address,
        /// Profile the event belongs to.
        profile: ProfileId,
        /// The observation itself.
        event: ProfileEvent,
    },
}

/// Adapter-scoped stack observations.
#[derive(Debug)]
pub enum AdapterEvent {
    /// Adapter power state changed.
    StateChanged {
        /// New power state.
        powered: bool,
    },
    /// Adapter properties changed.
    PropertiesChanged(Vec<AdapterProperty>),
    /// Device discovery started or stopped.
    DiscoveryStateChanged {
        /// Whether discovery is currently running.
        active: bool,
    },
    /// A classic device was discovered or re-observed.
    DeviceFound {
        /// Properties of the device, including its address.
        properties: Vec<DeviceProperty>,
    },
    /// Properties of a known classic device changed.
    DevicePropertiesChanged {
        /// Device address.
        address: Address,
        /// Changed properties.
        properties: Vec<DeviceProperty>,
    },
    /// A classic device disappeared.
    DeviceRemoved {
        /// Device address.
        address: Address,
    },
    /// An LE device passed the filter of a scan.
    LeDeviceFound {
        /// Scan the device matched.
        scan_id: u32,
        /// Properties of the device, including its address.
        properties: Vec<DeviceProperty>,
    },
    /// Properties of an LE device in a scan view changed.
    LeDevicePropertiesChanged {
        /// Scan the device belongs to.
        scan_id: u32,
        /// Device address.
        address: Address,
        /// Changed properties.
        properties: Vec<DeviceProperty>,
    },
    /// An LE device left a scan view.
    LeDeviceRemoved {
        /// Scan the device belonged to.
        scan_id: u32,
        /// Device address.
        address: Address,
    },
    /// A link key was stored for a device.
    LinkKeyCreated {
        /// Device address.
        address: Address,
        /// The link key octets.
        link_key: Vec<u8>,
    },
    /// A link key was removed for a device.
    LinkKeyDestroyed {
        /// Device address.
        address: Address,
    },
    /// The stack asks for a pairing secret.
    PairingSecretRequested {
        /// Device being paired.
        address: Address,
        /// Kind of secret requested.
        secret_type: PairingSecretType,
    },
    /// The stack asks to display a PIN code.
    PairingPinCodeDisplayed {
        /// Device being paired.
        address: Address,
        /// PIN to display.
        pin: String,
    },
    /// The stack asks to display a passkey.
    PairingPasskeyDisplayed {
        /// Device being paired.
        address: Address,
        /// Passkey to display.
        passkey: u32,
    },
    /// The stack asks to confirm a passkey.
    PairingConfirmationRequested {
        /// Device being paired.
        address: Address,
        /// Passkey to confirm.
        passkey: u32,
    },
    /// The in-progress pairing was canceled on the stack side.
    PairingCanceled,
    /// A remote LE central requested or dropped a connection.
    LeConnectionRequest {
        /// Remote device address.
        address: Address,
        /// Whether the link is being established.
        connected: bool,
    },
    /// Keep-alive supervision state changed.
    KeepAliveStateChanged {
        /// Whether keep-alive is running.
        enabled: bool,
    },
}

/// Profile-scoped stack observations.
#[derive(Debug)]
pub enum ProfileEvent {
    /// Properties of a device changed within the profile, most notably
    /// the `connected` flag.
    PropertiesChanged {
        /// Device address.
        device: Address,
        /// Changed properties.
        properties: Vec<DeviceProperty>,
    },
    /// AVRCP-specific observation.
    Avrcp(AvrcpEvent),
    /// OPP-specific observation.
    Opp(OppEvent),
}

/// AVRCP observer events.
#[derive(Debug)]
pub enum AvrcpEvent {
    /// The remote controller requested media metadata.
    MediaMetaDataRequested {
        /// Opaque stack request handle.
        request_id: u64,
        /// Requesting device.
        device: Address,
    },
    /// The remote controller requested play status.
    MediaPlayStatusRequested {
        /// Opaque stack request handle.
        request_id: u64,
        /// Requesting device.
        device: Address,
    },
    /// The remote target pushed media metadata.
    MediaMetaDataReceived {
        /// Sending device.
        device: Address,
        /// The metadata.
        meta_data: MediaMetaData,
    },
    /// The remote target pushed play status.
    MediaPlayStatusReceived {
        /// Sending device.
        device: Address,
        /// The play status.
        status: MediaPlayStatus,
    },
    /// A pass-through command arrived from the remote controller.
    PassThroughCommandReceived {
        /// Sending device.
        device: Address,
        /// Key code.
        key_code: PassThroughKeyCode,
        /// Key state.
        key_status: PassThroughKeyStatus,
    },
    /// The remote end changed the absolute volume.
    VolumeChanged {
        /// Device the volume belongs to.
        device: Address,
        /// Volume on the 7-bit AVRCP scale (0..=127).
        volume: u8,
    },
    /// Player application settings changed on the remote target.
    PlayerApplicationSettingsReceived {
        /// Sending device.
        device: Address,
        /// The changed settings.
        settings: Vec<PlayerApplicationSetting>,
    },
    /// Feature categories of the remote end were resolved.
    RemoteFeaturesReceived {
        /// Remote device.
        device: Address,
        /// Local role the features apply to.
        role: AvrcpRole,
        /// Feature category.
        features: RemoteFeatures,
    },
    /// The notification events supported by the remote target.
    SupportedNotificationEventsReceived {
        /// Remote device.
        device: Address,
        /// Raw event ids.
        events: Vec<u8>,
    },
    /// The remote target's player list.
    PlayerInfoReceived {
        /// Remote device.
        device: Address,
        /// Known players.
        players: Vec<PlayerInfo>,
    },
    /// The current browse folder changed.
    CurrentFolderReceived {
        /// Remote device.
        device: Address,
        /// Browse path of the current folder.
        folder: String,
    },
}

/// OPP observer events.
#[derive(Debug)]
pub enum OppEvent {
    /// A remote device wants to push an object to us.
    TransferConfirmationRequested {
        /// Opaque stack transfer handle.
        transfer_id: u64,
        /// Sending device.
        device: Address,
        /// Display name of the sending device.
        device_name: String,
        /// Name of the offered file.
        file_name: String,
        /// Size of the offered file in bytes.
        file_size: u64,
    },
    /// Progress of an incoming transfer; `transferred` is the delta
    /// since the previous report.
    TransferStateChanged {
        /// Opaque stack transfer handle.
        transfer_id: u64,
        /// Bytes received since the last report.
        transferred: u64,
        /// Whether the transfer finished (successfully or not).
        finished: bool,
    },
    /// Progress of an outgoing push started with `push_file`.
    PushProgress {
        /// Opaque stack transfer handle.
        transfer_id: u64,
        /// Stack error, if the push failed.
        error: Option<crate::SilError>,
        /// Total bytes sent so far.
        transferred: u64,
        /// Total size of the object.
        total: u64,
        /// Whether the transfer finished (successfully or not).
        finished: bool,
    },
}
