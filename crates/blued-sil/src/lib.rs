//! Stack Integration Library (SIL) boundary.
//!
//! The daemon core talks to a concrete Bluetooth stack exclusively
//! through the traits in this crate. Calls are asynchronous and resolve
//! when the stack reports completion; unsolicited observations arrive
//! as [`SilEvent`]s over a channel the service hands to the stack at
//! startup via [`Sil::register_observer`].

pub mod events;
#[cfg(feature = "fake")]
pub mod fake;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use blued_common::Address;
use tokio::sync::mpsc;

pub use events::{AdapterEvent, AvrcpEvent, OppEvent, ProfileEvent, SilEvent};
pub use types::*;

/// Errors of the stack's own enumeration, translated 1:1 onto the wire.
///
/// These numbers are distinct from the service error table (101..) and
/// are likewise fixed for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(u32)]
pub enum SilError {
    /// The operation failed for an unspecified reason.
    #[error("operation failed")]
    Failed = 1,
    /// The stack is not ready to serve the request.
    #[error("stack is not ready")]
    NotReady = 2,
    /// The requested resource is not available.
    #[error("resource is not available")]
    NotAvailable = 3,
    /// The stack is busy with a conflicting operation.
    #[error("stack is busy")]
    Busy = 4,
    /// The stack does not support the operation.
    #[error("operation is not supported")]
    Unsupported = 5,
    /// A parameter was rejected by the stack.
    #[error("invalid parameters")]
    InvalidParams = 6,
    /// The device address is unknown to the stack.
    #[error("unknown device address")]
    UnknownDeviceAddress = 7,
    /// Authentication was canceled.
    #[error("authentication canceled")]
    AuthenticationCanceled = 8,
    /// Authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed = 9,
    /// Authentication was rejected by the remote side.
    #[error("authentication rejected")]
    AuthenticationRejected = 10,
    /// Authentication timed out.
    #[error("authentication timed out")]
    AuthenticationTimeout = 11,
    /// The device is already paired.
    #[error("device already paired")]
    DeviceAlreadyPaired = 12,
    /// The device is not paired.
    #[error("device not paired")]
    DeviceNotPaired = 13,
    /// The device is already connected.
    #[error("device already connected")]
    DeviceAlreadyConnected = 14,
    /// The device is not connected.
    #[error("device not connected")]
    DeviceNotConnected = 15,
    /// The operation timed out.
    #[error("operation timed out")]
    TimedOut = 16,
}

impl SilError {
    /// The numeric wire code of the stack error.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Result of a SIL call.
pub type SilResult<T> = Result<T, SilError>;

/// Sink for stack observations.
pub type SilEventSender = mpsc::UnboundedSender<SilEvent>;

/// Entry point of a loaded stack implementation.
pub trait Sil: Send + Sync {
    /// Installs the observer sink. Must be called once before any other
    /// use; events observed earlier may be dropped.
    fn register_observer(&self, sink: SilEventSender);

    /// The adapters the stack currently exposes.
    fn adapters(&self) -> Vec<Arc<dyn SilAdapter>>;

    /// The adapter the stack considers default, if any.
    fn default_adapter(&self) -> Option<Arc<dyn SilAdapter>>;
}

/// One physical adapter as exposed by the stack.
#[async_trait]
pub trait SilAdapter: Send + Sync {
    /// The adapter address.
    fn address(&self) -> Address;

    /// Kernel interface name, e.g. `hci0`.
    fn interface_name(&self) -> String;

    /// Reads the full adapter property set.
    async fn adapter_properties(&self) -> SilResult<Vec<AdapterProperty>>;

    /// Writes one adapter property.
    async fn set_adapter_property(&self, property: AdapterProperty) -> SilResult<()>;

    /// Writes device properties (trusted, blocked, ...).
    async fn set_device_properties(
        &self,
        address: Address,
        properties: Vec<DeviceProperty>,
    ) -> SilResult<()>;

    /// Powers the adapter on.
    async fn enable(&self) -> SilResult<()>;

    /// Powers the adapter off.
    async fn disable(&self) -> SilResult<()>;

    /// Starts classic/interleaved discovery.
    fn start_discovery(&self) -> SilResult<()>;

    /// Cancels a running discovery.
    async fn cancel_discovery(&self) -> SilResult<()>;

    /// Starts the shared LE discovery engine.
    fn start_le_discovery(&self) -> SilResult<()>;

    /// Stops the shared LE discovery engine.
    fn cancel_le_discovery(&self) -> SilResult<()>;

    /// Registers an LE discovery filter and returns its scan id.
    fn add_le_discovery_filter(&self, filter: LeDiscoveryFilter) -> SilResult<u32>;

    /// Removes a previously registered LE discovery filter.
    fn remove_le_discovery_filter(&self, scan_id: u32);

    /// Replays already-known devices against the filter of `scan_id`.
    fn match_le_discovery_filter_devices(&self, scan_id: u32);

    /// Starts pairing with a remote device.
    async fn pair(&self, address: Address) -> SilResult<()>;

    /// Cancels an in-progress pairing.
    async fn cancel_pairing(&self, address: Address) -> SilResult<()>;

    /// Removes the bond with a remote device.
    async fn unpair(&self, address: Address) -> SilResult<()>;

    /// Supplies a pairing secret the stack asked for.
    fn supply_pairing_secret(&self, address: Address, secret: PairingSecret) -> SilResult<()>;

    /// Answers a pairing confirmation prompt.
    fn supply_pairing_confirmation(&self, address: Address, accept: bool) -> SilResult<()>;

    /// Allocates an advertiser instance.
    async fn register_advertiser(&self) -> SilResult<u8>;

    /// Starts advertising on a registered instance.
    async fn start_advertising(
        &self,
        advertiser_id: u8,
        settings: AdvertiserSettings,
        advertise_data: AdvertiseData,
        scan_response: AdvertiseData,
    ) -> SilResult<()>;

    /// Replaces the advertise data or scan response of an instance.
    async fn set_advertiser_data(
        &self,
        advertiser_id: u8,
        scan_response: bool,
        data: AdvertiseData,
    ) -> SilResult<()>;

    /// Replaces the settings of an instance.
    async fn set_advertiser_parameters(
        &self,
        advertiser_id: u8,
        settings: AdvertiserSettings,
    ) -> SilResult<()>;

    /// Stops advertising on an instance, keeping it registered.
    async fn disable_advertiser(&self, advertiser_id: u8) -> SilResult<()>;

    /// Releases an advertiser instance.
    async fn unregister_advertiser(&self, advertiser_id: u8) -> SilResult<()>;

    /// The generic profile backend for `profile`, if supported.
    fn profile(&self, profile: ProfileId) -> Option<Arc<dyn SilProfile>>;

    /// The AVRCP backend, if supported.
    fn avrcp(&self) -> Option<Arc<dyn SilAvrcp>>;

    /// The OPP backend, if supported.
    fn opp(&self) -> Option<Arc<dyn SilOpp>>;
}

/// Connect/disconnect contract shared by every profile backend.
#[async_trait]
pub trait SilProfile: Send + Sync {
    /// Whether the profile link to `address` is currently up.
    async fn is_connected(&self, address: Address) -> SilResult<bool>;

    /// Connects the profile to a remote device.
    async fn connect(&self, address: Address) -> SilResult<()>;

    /// Disconnects the profile from a remote device.
    async fn disconnect(&self, address: Address) -> SilResult<()>;

    /// Enables one role UUID of the profile.
    async fn enable_role(&self, uuid: &str) -> SilResult<()>;

    /// Disables one role UUID of the profile.
    async fn disable_role(&self, uuid: &str) -> SilResult<()>;
}

/// AVRCP backend.
#[async_trait]
pub trait SilAvrcp: SilProfile {
    /// Answers a metadata request previously observed via
    /// [`AvrcpEvent::MediaMetaDataRequested`].
    async fn supply_media_meta_data(
        &self,
        request_id: u64,
        meta_data: MediaMetaData,
    ) -> SilResult<()>;

    /// Answers a play-status request previously observed via
    /// [`AvrcpEvent::MediaPlayStatusRequested`].
    async fn supply_media_play_status(
        &self,
        request_id: u64,
        status: MediaPlayStatus,
    ) -> SilResult<()>;

    /// Dispatches a pass-through command to the remote target.
    fn send_pass_through_command(
        &self,
        address: Address,
        key_code: PassThroughKeyCode,
        key_status: PassThroughKeyStatus,
    ) -> SilResult<()>;

    /// Sets the absolute volume on the 7-bit AVRCP scale (0..=127).
    async fn set_absolute_volume(&self, address: Address, volume: u8) -> SilResult<()>;

    /// Applies player application setting deltas.
    async fn set_player_application_settings(
        &self,
        address: Address,
        settings: Vec<PlayerApplicationSetting>,
    ) -> SilResult<()>;

    /// Pushes a play-status change to the remote controller.
    async fn notify_media_play_status(
        &self,
        address: Address,
        status: MediaPlayStatus,
    ) -> SilResult<()>;

    /// Number of items in the current browse folder.
    async fn get_number_of_items(&self, address: Address) -> SilResult<u32>;

    /// Items of the current browse folder within `[start, end]`.
    async fn get_folder_items(
        &self,
        address: Address,
        start: u32,
        end: u32,
    ) -> SilResult<Vec<FolderItem>>;

    /// Descends into or out of a browse folder.
    async fn change_path(&self, address: Address, item_path: String) -> SilResult<()>;

    /// Starts playback of a browsed item.
    async fn play_item(&self, address: Address, item_path: String) -> SilResult<()>;

    /// Appends a browsed item to the now-playing queue.
    async fn add_to_now_playing(&self, address: Address, item_path: String) -> SilResult<()>;

    /// Searches the browse tree, returning the result folder path.
    async fn search(&self, address: Address, search_string: String) -> SilResult<String>;
}

/// OPP backend.
#[async_trait]
pub trait SilOpp: SilProfile {
    /// Starts pushing a local file, returning the transfer handle.
    async fn push_file(&self, address: Address, source_file: PathBuf) -> SilResult<u64>;

    /// Cancels a running transfer.
    async fn cancel_transfer(&self, transfer_id: u64) -> SilResult<()>;

    /// Accepts or rejects an incoming transfer request.
    async fn supply_transfer_confirmation(&self, transfer_id: u64, accept: bool) -> SilResult<()>;
}

/// A stack with no adapters.
///
/// Used when no vendor SIL is configured; the daemon starts with an
/// empty adapter list and every adapter-scoped method reports
/// `adapterNotAvailable`.
#[derive(Debug, Default)]
pub struct NullSil;

impl Sil for NullSil {
    fn register_observer(&self, _sink: SilEventSender) {}

    fn adapters(&self) -> Vec<Arc<dyn SilAdapter>> {
        Vec::new()
    }

    fn default_adapter(&self) -> Option<Arc<dyn SilAdapter>> {
        None
    }
}
