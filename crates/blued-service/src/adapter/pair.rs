//! Per-adapter pairing state.

use blued_common::Address;

/// Direction of the pairing in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingDirection {
    /// A remote device initiated the pairing.
    Incoming,
    /// A local caller initiated the pairing.
    Outgoing,
}

/// The pairing slot of one adapter.
///
/// At most one pairing runs at a time; `pairing()` holds the device in
/// progress for exactly as long as the slot is taken.
#[derive(Debug, Default)]
pub struct PairState {
    pairable: bool,
    pairable_timeout: u32,
    pairing: Option<(Address, PairingDirection)>,
}

impl PairState {
    /// Whether incoming pairing requests are accepted.
    pub fn is_pairable(&self) -> bool {
        self.pairable
    }

    /// Whether a pairing is in progress.
    pub fn is_pairing(&self) -> bool {
        self.pairing.is_some()
    }

    /// The device being paired, while a pairing is in progress.
    pub fn device(&self) -> Option<Address> {
        self.pairing.map(|(address, _)| address)
    }

    /// Whether the in-progress pairing was initiated by the remote side.
    pub fn is_incoming(&self) -> bool {
        matches!(self.pairing, Some((_, PairingDirection::Incoming)))
    }

    /// Whether the in-progress pairing was initiated locally.
    pub fn is_outgoing(&self) -> bool {
        matches!(self.pairing, Some((_, PairingDirection::Outgoing)))
    }

    /// Pairable timeout in seconds.
    pub fn pairable_timeout(&self) -> u32 {
        self.pairable_timeout
    }

    /// Updates the pairable flag.
    pub fn set_pairable(&mut self, pairable: bool) {
        self.pairable = pairable;
    }

    /// Updates the pairable timeout.
    pub fn set_pairable_timeout(&mut self, timeout: u32) {
        self.pairable_timeout = timeout;
    }

    /// Takes the pairing slot for `device`.
    pub fn start_pairing(&mut self, device: Address, direction: PairingDirection) {
        self.pairing = Some((device, direction));
    }

    /// Releases the pairing slot.
    pub fn stop_pairing(&mut self) {
        self.pairing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Address {
        "aa:bb:cc:dd:ee:ff".parse().expect("address")
    }

    #[test]
    fn slot_holds_exactly_one_device() {
        let mut state = PairState::default();
        assert!(!state.is_pairing());
        assert_eq!(state.device(), None);

        state.start_pairing(device(), PairingDirection::Outgoing);
        assert!(state.is_pairing());
        assert!(state.is_outgoing());
        assert!(!state.is_incoming());
        assert_eq!(state.device(), Some(device()));

        state.stop_pairing();
        assert!(!state.is_pairing());
        assert_eq!(state.device(), None);
    }

    #[test]
    fn direction_is_tracked() {
        let mut state = PairState::default();
        state.start_pairing(device(), PairingDirection::Incoming);
        assert!(state.is_incoming());
        assert!(!state.is_outgoing());
    }
}
