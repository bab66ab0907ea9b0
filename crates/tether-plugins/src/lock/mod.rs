//! Cross-process lock over a plugins directory.
//!
//! The lock is a marker file, `.tether.lock`, created with `create_new` so
//! exactly one holder can exist across threads and processes that share a
//! plugins directory. A marker older than the stale threshold is treated as
//! abandoned by a crashed holder and removed. [`LockToken`] releases the
//! marker when dropped, so every exit path of an operation unlocks.
//!
//! Each marker records its owner (pid, timestamp and an acquisition
//! sequence number). A token only removes a marker that still names it, so
//! a holder whose lock was broken as stale cannot unlock its successor.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::PluginError;

/// Name of the marker file inside the plugins directory.
pub const LOCK_FILE_NAME: &str = ".tether.lock";

const LOCK_TARGET: &str = "tether_plugins::lock";

static ACQUISITIONS: AtomicU64 = AtomicU64::new(0);

/// Timing parameters for [`LockManager::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// How long to wait for a held lock before giving up.
    pub wait: Duration,
    /// Age after which a held lock is considered abandoned.
    pub stale: Duration,
    /// Delay between acquisition attempts.
    pub poll: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(tether_config::DEFAULT_LOCK_WAIT_MS),
            stale: Duration::from_millis(tether_config::DEFAULT_LOCK_STALE_MS),
            poll: Duration::from_millis(50),
        }
    }
}

/// Hands out [`LockToken`]s for one plugins directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    settings: LockSettings,
}

impl LockManager {
    /// Creates a manager for the lock inside `plugins_path`.
    #[must_use]
    pub fn new(plugins_path: &Path, settings: LockSettings) -> Self {
        Self {
            path: plugins_path.join(LOCK_FILE_NAME),
            settings,
        }
    }

    /// Returns the marker file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the timing parameters.
    #[must_use]
    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// Blocks until the lock is held or the wait budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LockTimeout`] when another holder keeps the
    /// lock for longer than `wait`, and [`PluginError::Filesystem`] when the
    /// marker cannot be created for any reason other than contention.
    pub fn acquire(&self) -> Result<LockToken, PluginError> {
        let started = Instant::now();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PluginError::at(parent))?;
        }
        loop {
            match self.try_create() {
                Ok(owner) => {
                    debug!(target: LOCK_TARGET, file = %self.path.display(), owner, "lock acquired");
                    return Ok(LockToken {
                        path: self.path.clone(),
                        owner,
                        released: false,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    if self.break_if_stale()? {
                        continue;
                    }
                }
                Err(error) => return Err(PluginError::filesystem(&self.path, error)),
            }
            let waited = started.elapsed();
            if waited >= self.settings.wait {
                return Err(PluginError::LockTimeout {
                    path: self.path.clone(),
                    waited,
                });
            }
            thread::sleep(self.settings.poll.min(self.settings.wait - waited));
        }
    }

    fn try_create(&self) -> io::Result<String> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let sequence = ACQUISITIONS.fetch_add(1, Ordering::Relaxed);
        let owner = format!("{} {stamp} {sequence}", std::process::id());
        writeln!(file, "{owner}")?;
        Ok(owner)
    }

    /// Removes the marker when it is older than the stale threshold.
    ///
    /// Returns `true` when the caller should retry immediately.
    fn break_if_stale(&self) -> Result<bool, PluginError> {
        let modified = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            // Released between our attempt and the metadata read.
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(error) => return Err(PluginError::filesystem(&self.path, error)),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age < self.settings.stale {
            return Ok(false);
        }
        warn!(
            target: LOCK_TARGET,
            file = %self.path.display(),
            age_ms = age.as_millis(),
            "removing stale plugins lock"
        );
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(error) => Err(PluginError::filesystem(&self.path, error)),
        }
    }
}

/// Proof that the caller holds the plugins directory lock.
///
/// Internal operations that mutate the plugins directory take a
/// `&LockToken`, so they cannot run without one.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken {
    path: PathBuf,
    owner: String,
    released: bool,
}

impl LockToken {
    /// Returns the marker file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock now.
    ///
    /// A marker that no longer names this token (because another caller
    /// broke it as stale and took the lock) is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Filesystem`] when the marker cannot be read
    /// or removed.
    pub fn release(mut self) -> Result<(), PluginError> {
        self.released = true;
        self.remove_if_owned()
            .map_err(|error| PluginError::filesystem(&self.path, error))
    }

    fn remove_if_owned(&self) -> io::Result<()> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        };
        if contents.trim() != self.owner {
            warn!(
                target: LOCK_TARGET,
                file = %self.path.display(),
                owner = %self.owner,
                holder = %contents.trim(),
                "lock was taken over after going stale; leaving it in place"
            );
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
            _ => {
                debug!(target: LOCK_TARGET, file = %self.path.display(), "lock released");
                Ok(())
            }
        }
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = self.remove_if_owned() {
            warn!(
                target: LOCK_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to remove lock file"
            );
        }
    }
}
