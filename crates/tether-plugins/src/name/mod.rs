//! Validated plugin names.
//!
//! A plugin name is an optionally scoped package identifier
//! (`@scope/name` or `name`). Names are used verbatim as directory names
//! under the plugins path, so validation rejects anything that could escape
//! it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PluginError;

const MAX_NAME_LENGTH: usize = 214;

/// A validated plugin name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginName(String);

impl PluginName {
    /// Validates `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidPluginName`] when the name is empty, too
    /// long, contains characters outside `[A-Za-z0-9-._~]`, starts with `.`
    /// or `_`, or has a malformed scope.
    ///
    /// ```
    /// use tether_plugins::PluginName;
    ///
    /// assert!(PluginName::parse("@acme/left-pad").is_ok());
    /// assert!(PluginName::parse("../escape").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, PluginError> {
        let reject = |reason: &str| PluginError::InvalidPluginName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        };
        if name.is_empty() {
            return Err(reject("name is empty"));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(reject("name is longer than 214 characters"));
        }
        let segments: Vec<&str> = match name.strip_prefix('@') {
            Some(scoped) => {
                let (scope, local) = scoped
                    .split_once('/')
                    .ok_or_else(|| reject("scoped names must look like @scope/name"))?;
                vec![scope, local]
            }
            None => vec![name],
        };
        for segment in segments {
            validate_segment(segment).map_err(reject)?;
        }
        Ok(Self(name.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the scope without its `@`, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.0
            .strip_prefix('@')
            .and_then(|scoped| scoped.split_once('/'))
            .map(|(scope, _)| scope)
    }

    /// Returns the directory, relative to the plugins path, the plugin is
    /// installed into.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("name segments must not be empty");
    }
    if segment.starts_with('.') || segment.starts_with('_') {
        return Err("names must not start with '.' or '_'");
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
        return Err("names may only contain [A-Za-z0-9-._~]");
    }
    Ok(())
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PluginName {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PluginName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Splits a `require` request into the plugin name and optional sub-path.
///
/// `@scope/name/lib/x.rhai` yields `("@scope/name", Some("lib/x.rhai"))`;
/// `name` yields `("name", None)`.
pub(crate) fn split_request(request: &str) -> (&str, Option<&str>) {
    let boundary = if request.starts_with('@') {
        request
            .match_indices('/')
            .nth(1)
            .map(|(index, _)| index)
    } else {
        request.find('/')
    };
    match boundary {
        Some(index) => {
            let (name, rest) = request.split_at(index);
            let sub_path = &rest[1..];
            (name, (!sub_path.is_empty()).then_some(sub_path))
        }
        None => (request, None),
    }
}

#[cfg(test)]
mod tests;
