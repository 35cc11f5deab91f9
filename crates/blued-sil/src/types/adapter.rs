use blued_common::Address;
use serde::{Deserialize, Serialize};

/// One adapter property as reported or set through the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterProperty {
    /// Friendly adapter name.
    Name(String),
    /// Alias overriding the friendly name.
    Alias(String),
    /// Name of the underlying stack implementation.
    StackName(String),
    /// Version of the underlying stack implementation.
    StackVersion(String),
    /// Controller firmware version.
    FirmwareVersion(String),
    /// The adapter's own address.
    Address(Address),
    /// Kernel interface name, e.g. `hci0`.
    InterfaceName(String),
    /// Whether the adapter is discoverable.
    Discoverable(bool),
    /// Discoverable timeout in seconds, zero disables the timeout.
    DiscoverableTimeout(u32),
    /// Discovery timeout in seconds.
    DiscoveryTimeout(u32),
    /// Whether the adapter accepts incoming pairing.
    Pairable(bool),
    /// Pairable timeout in seconds, zero disables the timeout.
    PairableTimeout(u32),
    /// Class-of-device bitmask.
    ClassOfDevice(u32),
    /// Service-class UUIDs the adapter currently exposes.
    Uuids(Vec<String>),
}

/// Pairing input/output capability the daemon registers with the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingIoCapability {
    /// No means to display or enter a secret; just-works pairing only.
    NoInputNoOutput,
    /// Can display a secret but not enter one.
    DisplayOnly,
    /// Can display a secret and confirm yes/no.
    DisplayYesNo,
    /// Can enter a secret but not display one.
    KeyboardOnly,
    /// Can both enter and display secrets.
    KeyboardDisplay,
}

/// The kind of pairing secret the stack is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingSecretType {
    /// A numeric passkey (0..=999999).
    Passkey,
    /// A legacy PIN code string.
    PinCode,
}

/// A pairing secret supplied to or displayed by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingSecret {
    /// A numeric passkey (0..=999999).
    Passkey(u32),
    /// A legacy PIN code string.
    PinCode(String),
}
