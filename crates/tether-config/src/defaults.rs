//! Default values shared by the library and the CLI.

/// Default content registry queried for versioned installs.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Default git hosting API used for `owner/repo` references.
pub const DEFAULT_GIT_API_URL: &str = "https://api.github.com";

/// Directory created under the working directory when no plugins path is set.
pub const DEFAULT_PLUGINS_DIRECTORY: &str = "plugin_packages";

/// Default time spent waiting for the plugins directory lock.
pub const DEFAULT_LOCK_WAIT_MS: u64 = 120_000;

/// Default age after which an unreleased lock is broken.
pub const DEFAULT_LOCK_STALE_MS: u64 = 180_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}
