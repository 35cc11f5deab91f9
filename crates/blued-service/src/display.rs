//! Adapter-to-display assignment.
//!
//! An in-car head unit drives several displays from one box; a small
//! JSON file records which HCI interface serves which display. A
//! reassignment invalidates the interface's cached bond data and flips
//! the A2DP role the adapter should run (source towards rear-seat
//! displays, sink towards the main unit).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;

/// Logical display a physical adapter is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayTag {
    /// Left rear-seat display.
    #[serde(rename = "RSE-L")]
    RseLeft,
    /// Right rear-seat display.
    #[serde(rename = "RSE-R")]
    RseRight,
    /// Main audio/video/navigation unit.
    #[serde(rename = "AVN")]
    Avn,
}

impl DisplayTag {
    /// The A2DP role an adapter serving this display should run.
    pub const fn a2dp_role(self) -> A2dpRole {
        match self {
            Self::RseLeft | Self::RseRight => A2dpRole::Source,
            Self::Avn => A2dpRole::Sink,
        }
    }
}

/// A2DP role selected by a display assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2dpRole {
    /// Audio source towards the display.
    Source,
    /// Audio sink from external devices.
    Sink,
}

/// The assignment file plus bookkeeping to detect reassignments.
#[derive(Debug, Default)]
pub struct DisplayAssignments {
    path: Option<PathBuf>,
    assignments: HashMap<String, DisplayTag>,
}

impl DisplayAssignments {
    /// Loads the assignment file; a missing file yields an empty map.
    pub fn load(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let assignments = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(error) => {
                    warn!(path = %path.display(), %error, "ignoring malformed display assignment file");
                    HashMap::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => {
                warn!(path = %path.display(), %error, "cannot read display assignment file");
                HashMap::new()
            }
        };
        Self {
            path: Some(path),
            assignments,
        }
    }

    /// Current display of an interface, if assigned.
    pub fn display_for(&self, interface: &str) -> Option<DisplayTag> {
        self.assignments.get(interface).copied()
    }

    /// Records a (re)assignment and persists the file.
    ///
    /// Returns the previous display when the assignment actually
    /// changed; the caller is expected to clear the interface's bond
    /// cache and restart its A2DP role in that case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisplayAssignment`] when the file cannot be
    /// written; the in-memory assignment is updated regardless.
    pub fn assign(
        &mut self,
        interface: &str,
        display: DisplayTag,
    ) -> Result<Option<DisplayTag>, Error> {
        let previous = self.assignments.insert(interface.to_owned(), display);
        if previous == Some(display) {
            return Ok(None);
        }
        let new_display = display;
        let old_display = previous;
        debug!(interface, ?new_display, ?old_display, "display assignment changed");
        self.persist()?;
        Ok(previous)
    }

    fn persist(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(&self.assignments).map_err(|source| {
            Error::DisplayAssignment {
                path: path.display().to_string(),
                source: Box::new(source),
            }
        })?;
        std::fs::write(path, raw).map_err(|source| Error::DisplayAssignment {
            path: path.display().to_string(),
            source: Box::new(source),
        })
    }
}

/// Removes the cached bond directory of an interface.
pub fn clear_bond_cache(bond_root: &Path, interface: &str) {
    let path = bond_root.join(interface);
    match std::fs::remove_dir_all(&path) {
        Ok(()) => debug!(path = %path.display(), "cleared bond cache"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path.display(), %error, "cannot clear bond cache"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassignment_reports_previous_display() {
        let mut assignments = DisplayAssignments::default();
        assert_eq!(
            assignments.assign("hci0", DisplayTag::RseLeft).expect("assign"),
            None
        );
        assert_eq!(
            assignments.assign("hci0", DisplayTag::RseLeft).expect("assign"),
            None
        );
        assert_eq!(
            assignments.assign("hci0", DisplayTag::Avn).expect("assign"),
            Some(DisplayTag::RseLeft)
        );
        assert_eq!(assignments.display_for("hci0"), Some(DisplayTag::Avn));
    }

    #[test]
    fn display_tags_select_a2dp_roles() {
        assert_eq!(DisplayTag::RseLeft.a2dp_role(), A2dpRole::Source);
        assert_eq!(DisplayTag::RseRight.a2dp_role(), A2dpRole::Source);
        assert_eq!(DisplayTag::Avn.a2dp_role(), A2dpRole::Sink);
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("blued-display-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut assignments = DisplayAssignments::load(Some(path.clone()));
        assignments.assign("hci0", DisplayTag::RseRight).expect("assign");

        let reloaded = DisplayAssignments::load(Some(path.clone()));
        assert_eq!(reloaded.display_for("hci0"), Some(DisplayTag::RseRight));

        std::fs::remove_file(&path).expect("cleanup");
    }
}
