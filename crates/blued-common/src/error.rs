/// Fixed wire error-code table.
///
/// The numeric values are part of the wire contract and must never be
/// renumbered; new codes are appended monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum ErrorCode {
    AdapterNotAvailable = 101,
    MsgParseFail = 102,
    MthdNotSubscribed = 103,
    AllowOneSubscribe = 104,
    AddrParamMissing = 105,
    DeviceNotAvail = 106,
    PairingCanceled = 107,
    NoPairing = 108,
    DiscoveryToNegValue = 109,
    DiscoverableToNegValue = 110,
    PairableToNegValue = 111,
    PowerStateChangeFail = 112,
    AdapterPropertyFail = 113,
    StartDiscAdapterOffErr = 114,
    StartDiscFail = 115,
    StopDiscFail = 117,
    PairingInProg = 118,
    PasskeyParamMissing = 119,
    PinParamMissing = 120,
    AcceptParamMissing = 121,
    UnpairFail = 122,
    PairableFail = 123,
    PairingCancelTo = 124,
    IncomingPairDevUnavail = 125,
    PairableTo = 126,
    ProfileUnavail = 127,
    DevConnecting = 128,
    DevNotPaired = 129,
    ProfileConnectFail = 130,
    ProfileConnected = 131,
    ProfileDisconnectFail = 132,
    ProfileStateErr = 133,
    ProfileNotConnected = 136,
    SrcfileParamMissing = 137,
    SrcfileInvalid = 142,
    BadJson = 143,
    SchemaValidationFail = 144,
    NoPropChange = 148,
    DevicePropertyFail = 149,
    OppTransferCanceled = 152,
    OppPushPullFail = 153,
    OppNotConnected = 154,
    OppTransferNotAllowed = 155,
    OppRequestIdParamMissing = 156,
    OppStateErr = 157,
    OppRequestIdNotExist = 158,
    OppAlreadyAcceptFile = 159,
    OppTransferIdNotExist = 160,
    AdapterTurnedOff = 161,
    InvalidAdapterAddress = 162,
    AvrcpRequestIdParamMissing = 186,
    AvrcpRequestNotAllowed = 187,
    AvrcpRequestIdNotExist = 188,
    AvrcpStateErr = 189,
    NoPairingForRequestedAddress = 197,
    AvrcpDeviceAddressParamMissing = 237,
    AvrcpKeyCodeParamMissing = 238,
    AvrcpKeyStatusParamMissing = 239,
    AvrcpKeyCodeInvalidValueParam = 240,
    AvrcpKeyStatusInvalidValueParam = 241,
    AvrcpSendPassThroughCommandFailed = 242,
    AvrcpEqualizerInvalidValueParam = 243,
    AvrcpRepeatInvalidValueParam = 244,
    AvrcpShuffleInvalidValueParam = 245,
    AvrcpScanInvalidValueParam = 246,
    ProfileEnabled = 248,
    ProfileNotEnabled = 249,
    ProfileEnableFail = 250,
    ProfileDisableFail = 251,
    AvrcpVolumeParamMissing = 252,
    AvrcpVolumeInvalidValueParam = 253,
    AvrcpSetAbsoluteVolumeFailed = 254,
    BleAdvNoMoreAdvertiser = 257,
    MessageOwnerMissing = 276,
    AdvertiserIdParamMissing = 280,
    BleAdvExceedSizeLimit = 284,
    AvrcpNoConnectedDevices = 295,
    AvrcpStartIndexParamMissing = 300,
    AvrcpEndIndexParamMissing = 301,
    AvrcpItemPathParamMissing = 302,
    AvrcpSearchStringParamMissing = 303,
    AvrcpPlaybackStatusParamMissing = 308,
}

impl ErrorCode {
    /// The numeric wire code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// The human-readable text carried next to the code.
    pub const fn text(self) -> &'static str {
        match self {
            Self::AdapterNotAvailable => "Bluetooth adapter is not available",
            Self::MsgParseFail => "Failed to parse incoming message",
            Self::MthdNotSubscribed => "Method needs to be subscribed",
            Self::AllowOneSubscribe => "Only one subscription per method is allowed",
            Self::AddrParamMissing => "Required 'address' parameter is not supplied",
            Self::DeviceNotAvail => "Device with supplied address is not available",
            Self::PairingCanceled => "Pairing canceled by user",
            Self::NoPairing => "There is no pairing in progress",
            Self::DiscoveryToNegValue => "Discovery timeout can not be negative",
            Self::DiscoverableToNegValue => "Discoverable timeout can not be negative",
            Self::PairableToNegValue => "Pairable timeout can not be negative",
            Self::PowerStateChangeFail => "Failed to change adapter power state",
            Self::AdapterPropertyFail => "Failed to change adapter properties",
            Self::StartDiscAdapterOffErr => {
                "Discovery can not be started when adapter is turned off"
            }
            Self::StartDiscFail => "Failed to start discovery",
            Self::StopDiscFail => "Failed to stop discovery",
            Self::PairingInProg => "Another pairing operation is already in progress",
            Self::PasskeyParamMissing => "Required 'passkey' parameter is not supplied",
            Self::PinParamMissing => "Required 'pin' parameter is not supplied",
            Self::AcceptParamMissing => "Required 'accept' parameter is not supplied",
            Self::UnpairFail => "Failed to unpair with device",
            Self::PairableFail => "Failed to set adapter pairable",
            Self::PairingCancelTo => "Pairing canceled or timed out",
            Self::IncomingPairDevUnavail => "Device of incoming pairing request is not available",
            Self::PairableTo => "Pairable timeout reached",
            Self::ProfileUnavail => "Profile backend is not available",
            Self::DevConnecting => "Device is already connecting",
            Self::DevNotPaired => "Device is not paired",
            Self::ProfileConnectFail => "Failed to connect with remote device",
            Self::ProfileConnected => "Already connected with remote device",
            Self::ProfileDisconnectFail => "Failed to disconnect from remote device",
            Self::ProfileStateErr => "Failed to retrieve profile state",
            Self::ProfileNotConnected => "Device is not connected to profile",
            Self::SrcfileParamMissing => "Required 'sourceFile' parameter is not supplied",
            Self::SrcfileInvalid => "Supplied source file does not exist or is invalid",
            Self::BadJson => "Invalid JSON input",
            Self::SchemaValidationFail => "The JSON input does not match the expected schema",
            Self::NoPropChange => "No property changes were supplied",
            Self::DevicePropertyFail => "Failed to change device properties",
            Self::OppTransferCanceled => "Transfer was canceled",
            Self::OppPushPullFail => "Failed to transfer file",
            Self::OppNotConnected => "Device is not connected to OPP",
            Self::OppTransferNotAllowed => "Incoming transfer requests are not allowed",
            Self::OppRequestIdParamMissing => "Required 'requestId' parameter is not supplied",
            Self::OppStateErr => "Failed to confirm the transfer request",
            Self::OppRequestIdNotExist => "Supplied request id does not exist",
            Self::OppAlreadyAcceptFile => "Transfer request has already been accepted",
            Self::OppTransferIdNotExist => "Transfer for supplied request id does not exist",
            Self::AdapterTurnedOff => "Adapter is turned off",
            Self::InvalidAdapterAddress => "Invalid adapter address",
            Self::AvrcpRequestIdParamMissing => "Required 'requestId' parameter is not supplied",
            Self::AvrcpRequestNotAllowed => "Media requests are not being accepted",
            Self::AvrcpRequestIdNotExist => "Supplied request id does not exist",
            Self::AvrcpStateErr => "Failed to supply the requested media data",
            Self::NoPairingForRequestedAddress => {
                "There is no pairing in progress for the requested address"
            }
            Self::AvrcpDeviceAddressParamMissing => {
                "Required 'address' parameter is not supplied"
            }
            Self::AvrcpKeyCodeParamMissing => "Required 'keyCode' parameter is not supplied",
            Self::AvrcpKeyStatusParamMissing => "Required 'keyStatus' parameter is not supplied",
            Self::AvrcpKeyCodeInvalidValueParam => "Supplied 'keyCode' value is invalid",
            Self::AvrcpKeyStatusInvalidValueParam => "Supplied 'keyStatus' value is invalid",
            Self::AvrcpSendPassThroughCommandFailed => "Failed to send pass-through command",
            Self::AvrcpEqualizerInvalidValueParam => "Supplied 'equalizer' value is invalid",
            Self::AvrcpRepeatInvalidValueParam => "Supplied 'repeat' value is invalid",
            Self::AvrcpShuffleInvalidValueParam => "Supplied 'shuffle' value is invalid",
            Self::AvrcpScanInvalidValueParam => "Supplied 'scan' value is invalid",
            Self::ProfileEnabled => "Profile role is already enabled",
            Self::ProfileNotEnabled => "Profile role is not enabled",
            Self::ProfileEnableFail => "Failed to enable profile role",
            Self::ProfileDisableFail => "Failed to disable profile role",
            Self::AvrcpVolumeParamMissing => "Required 'volume' parameter is not supplied",
            Self::AvrcpVolumeInvalidValueParam => "Supplied 'volume' value is out of range",
            Self::AvrcpSetAbsoluteVolumeFailed => "Failed to set absolute volume",
            Self::BleAdvNoMoreAdvertiser => "No more advertiser instances are available",
            Self::MessageOwnerMissing => "Message owner is missing",
            Self::AdvertiserIdParamMissing => "Required 'advertiserId' parameter is not supplied",
            Self::BleAdvExceedSizeLimit => "Advertising data exceeds the size limit",
            Self::AvrcpNoConnectedDevices => "No devices are connected to AVRCP",
            Self::AvrcpStartIndexParamMissing => "Required 'startIndex' parameter is not supplied",
            Self::AvrcpEndIndexParamMissing => "Required 'endIndex' parameter is not supplied",
            Self::AvrcpItemPathParamMissing => "Required 'itemPath' parameter is not supplied",
            Self::AvrcpSearchStringParamMissing => {
                "Required 'searchString' parameter is not supplied"
            }
            Self::AvrcpPlaybackStatusParamMissing => {
                "Required 'playbackStatus' parameter is not supplied"
            }
        }
    }
}
