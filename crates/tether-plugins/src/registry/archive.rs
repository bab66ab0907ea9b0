//! Safe extraction of gzip-compressed package tarballs.
//!
//! Registry tarballs wrap the package in one top-level directory
//! (`package/` for content registries, `<owner>-<repo>-<sha>/` for git
//! snapshots). That directory is stripped so the package root lands at the
//! destination. Link entries are skipped, and entries containing `..` or an
//! absolute root are rejected.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::warn;

use super::REGISTRY_TARGET;
use crate::error::PluginError;

/// Unpacks a gzip tarball into `destination`, creating it if needed.
///
/// # Errors
///
/// Returns [`PluginError::Archive`] when the archive is corrupt or an entry
/// would escape `destination`.
pub fn unpack_tarball(name: &str, bytes: &[u8], destination: &Path) -> Result<(), PluginError> {
    unpack(name, GzDecoder::new(bytes), destination)
}

fn unpack<R: Read>(name: &str, reader: R, destination: &Path) -> Result<(), PluginError> {
    let failed = |message: String| PluginError::Archive {
        name: name.to_owned(),
        message,
    };
    fs::create_dir_all(destination).map_err(PluginError::at(destination))?;
    let root = fs::canonicalize(destination).map_err(PluginError::at(destination))?;

    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|error| failed(error.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|error| failed(error.to_string()))?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            warn!(target: REGISTRY_TARGET, name, "skipping link entry in package archive");
            continue;
        }
        let path = entry
            .path()
            .map_err(|error| failed(error.to_string()))?
            .into_owned();
        let Some(relative) = strip_archive_root(&path).map_err(&failed)? else {
            continue;
        };

        let target = root.join(&relative);
        if kind.is_dir() {
            fs::create_dir_all(&target).map_err(PluginError::at(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(PluginError::at(parent))?;
            let parent = fs::canonicalize(parent).map_err(PluginError::at(parent))?;
            if !parent.starts_with(&root) {
                return Err(failed(format!(
                    "entry {} escapes the package directory",
                    path.display()
                )));
            }
        }
        entry
            .unpack(&target)
            .map_err(|error| failed(format!("{}: {error}", path.display())))?;
    }
    Ok(())
}

/// Drops the first path component and validates the remainder.
///
/// Returns `Ok(None)` for the top-level directory entry itself.
pub(crate) fn strip_archive_root(path: &Path) -> Result<Option<PathBuf>, String> {
    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }
    for component in stripped.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "archive contains unsafe path component: {}",
                    path.display()
                ));
            }
        }
    }
    Ok(Some(stripped))
}
