//! Filesystem layout for object transfers.
//!
//! Transfer destinations are composed as
//! `<root>/<profile>/<address with ':' replaced by '_'>/<subfolders>/<file>`;
//! missing directories are created with mode 0755. Sources handed to
//! outgoing pushes are resolved under the same root and must not escape
//! it.

use std::path::{Component, Path, PathBuf};

use blued_common::Address;
use blued_sil::types::ProfileId;

use crate::error::Error;

/// Builds the destination path for a received object.
pub fn transfer_destination(
    root: &Path,
    profile: ProfileId,
    device: Address,
    subfolders: &[&str],
    file_name: &str,
) -> PathBuf {
    let mut path = root.join(profile.mnemonic().to_lowercase());
    path.push(device.to_path_component());
    for folder in subfolders {
        path.push(folder);
    }
    path.push(file_name);
    path
}

/// Resolves a caller-supplied relative path under the storage root.
///
/// Returns `None` when the path is absolute or tries to escape the root
/// through parent components.
pub fn resolve_source(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Whether a resolved source file exists and is a regular file.
pub fn is_valid_source(path: &Path) -> bool {
    path.metadata().map(|meta| meta.is_file()).unwrap_or(false)
}

/// Creates every missing directory of `path` with mode 0755.
///
/// # Errors
///
/// Returns [`Error::Storage`] when a directory cannot be created or its
/// permissions cannot be set.
pub fn ensure_directory(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        if matches!(component, Component::RootDir | Component::Prefix(_)) {
            continue;
        }
        if current.is_dir() {
            continue;
        }
        std::fs::create_dir(&current).map_err(|source| Error::Storage {
            path: current.display().to_string(),
            source,
        })?;
        std::fs::set_permissions(&current, std::fs::Permissions::from_mode(0o755)).map_err(
            |source| Error::Storage {
                path: current.display().to_string(),
                source,
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        "aa:bb:cc:dd:ee:ff".parse().expect("address")
    }

    #[test]
    fn destination_layout() {
        let path = transfer_destination(
            Path::new("/media/internal"),
            ProfileId::Opp,
            address(),
            &["inbox"],
            "hello.txt",
        );
        assert_eq!(
            path,
            PathBuf::from("/media/internal/opp/aa_bb_cc_dd_ee_ff/inbox/hello.txt")
        );
    }

    #[test]
    fn source_resolution_stays_under_root() {
        let root = Path::new("/media/internal");
        assert_eq!(
            resolve_source(root, "downloads/song.mp3"),
            Some(PathBuf::from("/media/internal/downloads/song.mp3"))
        );
        assert!(resolve_source(root, "../etc/passwd").is_none());
        assert!(resolve_source(root, "/etc/passwd").is_none());
    }

    #[test]
    fn ensure_directory_creates_chain() {
        let base = std::env::temp_dir().join(format!("blued-storage-{}", std::process::id()));
        let nested = base.join("opp/aa_bb_cc_dd_ee_ff");
        ensure_directory(&nested).expect("create");
        assert!(nested.is_dir());
        std::fs::remove_dir_all(&base).expect("cleanup");
    }
}
