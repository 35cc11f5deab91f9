//! Data types crossing the SIL boundary.

mod adapter;
mod avrcp;
mod device;
mod le;
mod profile;

pub use adapter::{
    AdapterProperty, PairingIoCapability, PairingSecret, PairingSecretType,
};
pub use avrcp::{
    AvrcpRole, Equalizer, FolderItem, FolderItemType, MediaMetaData, MediaPlayStatus,
    PassThroughKeyCode, PassThroughKeyStatus, PlayStatus, PlayerApplicationSetting, PlayerInfo,
    PlayerType, RemoteFeatures, Repeat, Scan, Shuffle,
};
pub use device::{DeviceProperty, DeviceType};
pub use le::{
    AdvertiseData, AdvertisedService, AdvertiserSettings, LeDiscoveryFilter,
    ManufacturerDataFilter, ProprietaryData, ServiceDataFilter, UuidFilter,
};
pub use profile::ProfileId;
