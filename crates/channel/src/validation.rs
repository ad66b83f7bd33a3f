//! File names on the wire.
//!
//! The sender puts only the basename of its path on the wire. The receiver
//! treats whatever arrives as untrusted and keeps it inside its output
//! directory.

use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Joins a received file name onto `base`, refusing names that could land
/// outside it. Missing parent directories are not created here.
pub fn resolve_destination(base: &Path, name: &str) -> Result<PathBuf, TransferError> {
    let refused = |why: &str| TransferError::InvalidPath(format!("{why}: {name:?}"));

    if name.is_empty() {
        return Err(refused("empty file name"));
    }

    let relative = Path::new(name);
    let escapes = relative.components().find_map(|component| match component {
        Component::ParentDir => Some("name climbs out of the output directory"),
        Component::RootDir | Component::Prefix(_) => Some("name is not relative"),
        Component::CurDir | Component::Normal(_) => None,
    });
    if let Some(why) = escapes {
        return Err(refused(why));
    }
    if relative.is_absolute() {
        return Err(refused("name is not relative"));
    }

    Ok(base.join(relative))
}

/// Returns the final component of `path` as the name to put on the wire.
pub fn wire_name(path: &Path) -> Result<String, TransferError> {
    let name = path
        .file_name()
        .ok_or_else(|| TransferError::InvalidPath(format!("no file name in {}", path.display())))?;
    name.to_str().map(str::to_owned).ok_or_else(|| {
        TransferError::InvalidPath(format!("file name is not UTF-8: {}", path.display()))
    })
}
