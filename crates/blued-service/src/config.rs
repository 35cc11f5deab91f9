//! Daemon configuration.

use std::path::{Path, PathBuf};

use blued_sil::types::{PairingIoCapability, ProfileId};
use serde::Deserialize;

use crate::error::Error;

/// Environment variable overriding the configured IO capability.
pub const IO_CAPABILITY_ENV: &str = "BLUED_PAIRING_IO_CAPABILITY";

/// Daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DaemonConfig {
    /// Service classes the daemon exposes profile categories for.
    pub enabled_service_classes: Vec<ProfileId>,
    /// Pairing IO capability registered with the stack.
    pub pairing_io_capability: PairingIoCapability,
    /// Root every transfer source and destination is resolved under.
    pub storage_root: PathBuf,
    /// Path of the adapter-to-display assignment file, if used.
    pub display_assignment_path: Option<PathBuf>,
    /// Directory holding per-interface cached bond data.
    pub bond_cache_root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled_service_classes: ProfileId::ALL.to_vec(),
            pairing_io_capability: PairingIoCapability::NoInputNoOutput,
            storage_root: PathBuf::from("/media/internal"),
            display_assignment_path: None,
            bond_cache_root: PathBuf::from("/var/lib/blued/bonds"),
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration from `path` and applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Config {
            path: path.display().to_string(),
            source: Box::new(source),
        })?;
        let mut config: Self = toml::from_str(&raw).map_err(|source| Error::Config {
            path: path.display().to_string(),
            source: Box::new(source),
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Whether the service class is enabled at all.
    pub fn is_service_class_enabled(&self, profile: ProfileId) -> bool {
        self.enabled_service_classes.contains(&profile)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(IO_CAPABILITY_ENV) {
            match value.as_str() {
                "NoInputNoOutput" => {
                    self.pairing_io_capability = PairingIoCapability::NoInputNoOutput;
                }
                "DisplayOnly" => self.pairing_io_capability = PairingIoCapability::DisplayOnly,
                "DisplayYesNo" => self.pairing_io_capability = PairingIoCapability::DisplayYesNo,
                "KeyboardOnly" => self.pairing_io_capability = PairingIoCapability::KeyboardOnly,
                "KeyboardDisplay" => {
                    self.pairing_io_capability = PairingIoCapability::KeyboardDisplay;
                }
                other => {
                    tracing::warn!(capability = %other, "unknown pairing capability override");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_every_profile() {
        let config = DaemonConfig::default();
        assert!(config.is_service_class_enabled(ProfileId::Avrcp));
        assert!(config.is_service_class_enabled(ProfileId::Opp));
    }

    #[test]
    fn parses_partial_toml() {
        let config: DaemonConfig = toml::from_str(
            r#"
            enabled-service-classes = ["OPP", "AVRCP"]
            storage-root = "/tmp/blued"
            "#,
        )
        .expect("config");
        assert_eq!(
            config.enabled_service_classes,
            vec![ProfileId::Opp, ProfileId::Avrcp]
        );
        assert!(!config.is_service_class_enabled(ProfileId::Hid));
        assert_eq!(config.storage_root, PathBuf::from("/tmp/blued"));
    }
}
