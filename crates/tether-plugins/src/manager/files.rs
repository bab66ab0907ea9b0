//! Filesystem helpers for materialising packages in the plugins directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::PluginError;
use crate::lock::LOCK_FILE_NAME;
use crate::package::{DESCRIPTOR_FILE, PackageDescriptor, PackageInfo};

/// Prefix of in-progress install directories; discovery skips dot entries.
const STAGING_PREFIX: &str = ".staging-";

/// Entries never copied out of a source package directory.
const SKIPPED_ENTRIES: [&str; 2] = [".git", LOCK_FILE_NAME];

/// Removes `path` and everything below it; a missing path is fine.
pub(super) fn remove_tree(path: &Path) -> Result<(), PluginError> {
    match fs::remove_dir_all(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => {
            Err(PluginError::filesystem(path, error))
        }
        _ => Ok(()),
    }
}

/// Returns the staging directory used while installing `name`.
pub(super) fn staging_path(plugins_path: &Path, name: &str) -> PathBuf {
    plugins_path.join(format!("{STAGING_PREFIX}{}", name.replace('/', "+")))
}

/// Moves a completely written `staging` tree to `destination`, replacing
/// whatever was installed there.
pub(super) fn replace_tree(staging: &Path, destination: &Path) -> Result<(), PluginError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(PluginError::at(parent))?;
    }
    remove_tree(destination)?;
    fs::rename(staging, destination).map_err(PluginError::at(destination))
}

/// Removes the `@scope` directory holding `location` once it is empty.
pub(super) fn remove_empty_scope(plugins_path: &Path, location: &Path) -> Result<(), PluginError> {
    let Some(scope) = location
        .parent()
        .filter(|parent| *parent != plugins_path && is_scope(Some(*parent)))
    else {
        return Ok(());
    };
    let mut entries = match fs::read_dir(scope) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(PluginError::filesystem(scope, error)),
    };
    if entries.next().is_some() {
        return Ok(());
    }
    match fs::remove_dir(scope) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => {
            Err(PluginError::filesystem(scope, error))
        }
        _ => Ok(()),
    }
}

/// Copies the package at `source` into `destination`.
///
/// Symlinks are not followed and are skipped, so a package cannot pull in
/// files from outside its own tree.
pub(super) fn copy_tree(source: &Path, destination: &Path) -> Result<(), PluginError> {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !SKIPPED_ENTRIES
                    .iter()
                    .any(|skipped| entry.file_name() == *skipped)
        });
    for entry in walker {
        let entry = entry.map_err(|error| {
            let path = error
                .path()
                .map_or_else(|| source.to_path_buf(), Path::to_path_buf);
            PluginError::filesystem(path, io::Error::other(error))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|error| PluginError::filesystem(entry.path(), io::Error::other(error)))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(PluginError::at(&target))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(PluginError::at(&target))?;
        }
    }
    Ok(())
}

/// Writes a single-file package holding `code` as its entry script.
pub(super) fn write_code_package(
    package: &PackageInfo,
    code: &str,
    destination: &Path,
) -> Result<(), PluginError> {
    fs::create_dir_all(destination).map_err(PluginError::at(destination))?;
    let main = destination.join(&package.main);
    fs::write(&main, code).map_err(PluginError::at(&main))?;
    package.to_descriptor().write(destination)
}

/// Writes a descriptor when the fetched contents did not include one.
pub(super) fn ensure_descriptor(package: &PackageInfo, destination: &Path) -> Result<(), PluginError> {
    if PackageDescriptor::read(destination).is_ok() {
        return Ok(());
    }
    package.to_descriptor().write(destination)
}

/// Returns true when both paths name the same existing directory.
pub(super) fn same_directory(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

/// Lists directories directly below `plugins_path`, or below an `@scope`
/// directory, that hold a package descriptor.
pub(super) fn package_directories(plugins_path: &Path) -> Result<Vec<PathBuf>, PluginError> {
    if !plugins_path.is_dir() {
        return Ok(Vec::new());
    }
    let walker = WalkDir::new(plugins_path)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            entry.file_type().is_dir()
                && !entry.file_name().to_string_lossy().starts_with('.')
                && (entry.depth() == 1 || is_scope(entry.path().parent()))
        });
    let mut directories = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|error| {
            let path = error
                .path()
                .map_or_else(|| plugins_path.to_path_buf(), Path::to_path_buf);
            PluginError::filesystem(path, io::Error::other(error))
        })?;
        if entry.path().join(DESCRIPTOR_FILE).is_file() {
            directories.push(entry.into_path());
        }
    }
    Ok(directories)
}

fn is_scope(path: Option<&Path>) -> bool {
    path.and_then(Path::file_name)
        .is_some_and(|name| name.to_string_lossy().starts_with('@'))
}
