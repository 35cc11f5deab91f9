use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 48-bit Bluetooth device address.
///
/// Addresses are canonical lowercase `aa:bb:cc:dd:ee:ff` internally,
/// regardless of the case or separator (`:` or `-`) used on input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 6]);

/// The supplied string is not a valid 48-bit Bluetooth address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid bluetooth address: {0:?}")]
pub struct AddressParseError(pub String);

impl Address {
    /// Creates an address from raw octets, most significant first.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The raw octets, most significant first.
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Canonical form with `:` replaced by `_`, as used in storage paths.
    pub fn to_path_component(&self) -> String {
        self.to_string().replace(':', "_")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut groups = 0;

        for group in s.split(['-', ':']) {
            if groups == 6 || group.len() != 2 {
                return Err(AddressParseError(s.to_owned()));
            }
            octets[groups] = u8::from_str_radix(group, 16)
                .map_err(|_| AddressParseError(s.to_owned()))?;
            groups += 1;
        }

        if groups != 6 {
            return Err(AddressParseError(s.to_owned()));
        }

        Ok(Self(octets))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_separated() {
        let address: Address = "aa:bb:cc:dd:ee:ff".parse().expect("valid address");
        assert_eq!(address.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn canonicalizes_case() {
        let address: Address = "AA:BB:CC:DD:EE:FF".parse().expect("valid address");
        assert_eq!(address.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn accepts_dash_separator() {
        let address: Address = "00-11-22-33-44-55".parse().expect("valid address");
        assert_eq!(address.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("00:11:22:33:44".parse::<Address>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<Address>().is_err());
        assert!("0:11:22:33:44:555".parse::<Address>().is_err());
        assert!("zz:11:22:33:44:55".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn path_component_replaces_separators() {
        let address: Address = "aa:bb:cc:dd:ee:ff".parse().expect("valid address");
        assert_eq!(address.to_path_component(), "aa_bb_cc_dd_ee_ff");
    }

    #[test]
    fn serde_round_trip() {
        let address: Address = "aa:bb:cc:dd:ee:ff".parse().expect("valid address");
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, "\"aa:bb:cc:dd:ee:ff\"");
        let back: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, address);
    }
}
