use serde::{Deserialize, Serialize};

/// Service classes the daemon can expose a profile category for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum ProfileId {
    A2dp,
    Avrcp,
    Gatt,
    Hfp,
    Hid,
    Map,
    Mesh,
    Opp,
    Pan,
    Pbap,
    Spp,
}

impl ProfileId {
    /// All profiles in registration order.
    pub const ALL: [Self; 11] = [
        Self::Opp,
        Self::A2dp,
        Self::Gatt,
        Self::Pbap,
        Self::Avrcp,
        Self::Spp,
        Self::Hfp,
        Self::Pan,
        Self::Hid,
        Self::Map,
        Self::Mesh,
    ];

    /// The short mnemonic used in configuration and role names.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::A2dp => "A2DP",
            Self::Avrcp => "AVRCP",
            Self::Gatt => "GATT",
            Self::Hfp => "HFP",
            Self::Hid => "HID",
            Self::Map => "MAP",
            Self::Mesh => "MESH",
            Self::Opp => "OPP",
            Self::Pan => "PAN",
            Self::Pbap => "PBAP",
            Self::Spp => "SPP",
        }
    }

    /// The RPC category the profile is served under.
    pub const fn category(self) -> &'static str {
        match self {
            Self::A2dp => "/a2dp",
            Self::Avrcp => "/avrcp",
            Self::Gatt => "/gatt",
            Self::Hfp => "/hfp",
            Self::Hid => "/hid",
            Self::Map => "/map",
            Self::Mesh => "/mesh",
            Self::Opp => "/opp",
            Self::Pan => "/pan",
            Self::Pbap => "/pbap",
            Self::Spp => "/spp",
        }
    }

    /// Service-class UUIDs the profile covers. The first entry is the
    /// primary role, further entries are secondary roles (for AVRCP the
    /// controller and target, for A2DP source and sink).
    pub const fn uuids(self) -> &'static [&'static str] {
        match self {
            Self::A2dp => &[
                "0000110a-0000-1000-8000-00805f9b34fb",
                "0000110b-0000-1000-8000-00805f9b34fb",
            ],
            Self::Avrcp => &[
                "0000110c-0000-1000-8000-00805f9b34fb",
                "0000110e-0000-1000-8000-00805f9b34fb",
            ],
            Self::Gatt => &["00001801-0000-1000-8000-00805f9b34fb"],
            Self::Hfp => &[
                "0000111e-0000-1000-8000-00805f9b34fb",
                "0000111f-0000-1000-8000-00805f9b34fb",
            ],
            Self::Hid => &["00001124-0000-1000-8000-00805f9b34fb"],
            Self::Map => &[
                "00001132-0000-1000-8000-00805f9b34fb",
                "00001133-0000-1000-8000-00805f9b34fb",
            ],
            Self::Mesh => &["00001827-0000-1000-8000-00805f9b34fb"],
            Self::Opp => &["00001105-0000-1000-8000-00805f9b34fb"],
            Self::Pan => &["00001116-0000-1000-8000-00805f9b34fb"],
            Self::Pbap => &[
                "0000112e-0000-1000-8000-00805f9b34fb",
                "0000112f-0000-1000-8000-00805f9b34fb",
            ],
            Self::Spp => &["00001101-0000-1000-8000-00805f9b34fb"],
        }
    }

    /// Role names parallel to [`Self::uuids`], used by the profile
    /// `enable`/`disable` methods to select a single role.
    pub const fn role_names(self) -> &'static [&'static str] {
        match self {
            Self::A2dp => &["A2DP_SRC", "A2DP_SNK"],
            Self::Avrcp => &["AVRCP_TGT", "AVRCP_RMT"],
            Self::Hfp => &["HFP_HF", "HFP_AG"],
            Self::Map => &["MAP_MSE", "MAP_MCE"],
            Self::Pbap => &["PBAP_PCE", "PBAP_PSE"],
            Self::Gatt => &["GATT"],
            Self::Hid => &["HID"],
            Self::Mesh => &["MESH"],
            Self::Opp => &["OPP"],
            Self::Pan => &["PAN"],
            Self::Spp => &["SPP"],
        }
    }

    /// Looks a profile up by its mnemonic, case-insensitively.
    pub fn from_mnemonic(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.mnemonic().eq_ignore_ascii_case(value))
    }
}

#[cfg(test)]
mod tests {
    use super::ProfileId;

    #[test]
    fn mnemonic_lookup_is_case_insensitive() {
        assert_eq!(ProfileId::from_mnemonic("avrcp"), Some(ProfileId::Avrcp));
        assert_eq!(ProfileId::from_mnemonic("OPP"), Some(ProfileId::Opp));
        assert_eq!(ProfileId::from_mnemonic("ftp"), None);
    }

    #[test]
    fn categories_are_unique() {
        let mut categories: Vec<_> = ProfileId::ALL.iter().map(|p| p.category()).collect();
        categories.sort_unstable();
        categories.dedup();
        assert_eq!(categories.len(), ProfileId::ALL.len());
    }
}
