//! Version references: the closed set of ways a plugin source is named.
//!
//! [`VersionRef::parse`] resolves the shape of a user-supplied string once,
//! at the entry of an install, so later stages match on the variant instead
//! of re-inspecting strings.

mod range;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use semver::Version;

use crate::error::PluginError;

pub use self::range::VersionRange;

/// A git-hosted repository, optionally pinned to a branch, tag, or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRef {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch, tag, or commit. `None` selects the default branch.
    pub reference: Option<String>,
}

impl GitRef {
    /// Creates a reference to the default branch of `owner/repo`.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            reference: None,
        }
    }

    /// Pins the reference to a branch, tag, or commit.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Parses `owner/repo[#ref]`, with an optional `github:` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidVersionSpec`] when the input is not in
    /// that form.
    pub fn parse(input: &str) -> Result<Self, PluginError> {
        let invalid = |reason: &str| PluginError::InvalidVersionSpec {
            input: input.to_owned(),
            reason: reason.to_owned(),
        };
        let body = input.trim();
        let body = body.strip_prefix("github:").unwrap_or(body);
        let (repository, reference) = match body.split_once('#') {
            Some((repository, reference)) if !reference.is_empty() => {
                (repository, Some(reference.to_owned()))
            }
            Some(_) => return Err(invalid("empty git reference after '#'")),
            None => (body, None),
        };
        let (owner, repo) = repository
            .split_once('/')
            .ok_or_else(|| invalid("expected owner/repo"))?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        for part in [owner, repo] {
            if part.is_empty()
                || !part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(invalid("owner and repository must be plain identifiers"));
            }
        }
        Ok(Self {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            reference,
        })
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(reference) = &self.reference {
            write!(f, "#{reference}")?;
        }
        Ok(())
    }
}

/// How a plugin source is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRef {
    /// One published version.
    Exact(Version),
    /// Any published version matching a range.
    Range(VersionRange),
    /// A git-hosted repository.
    Git(GitRef),
    /// A package directory on the local filesystem.
    Path(PathBuf),
    /// Inline script source.
    Code {
        /// The script text.
        source: String,
        /// Version recorded for the synthesised package.
        version: Option<Version>,
    },
}

impl VersionRef {
    /// The `latest` reference used when callers give none.
    #[must_use]
    pub fn latest() -> Self {
        Self::Range(VersionRange::any())
    }

    /// Classifies `input`.
    ///
    /// Precedence: `code:` prefix, then `file:` prefix or a path starting
    /// with `./`, `../`, `/` or `~/`, then `github:owner/repo[#ref]` or
    /// `owner/repo[#ref]`, then an exact version (optionally prefixed by
    /// `v` or `=`), then a range expression.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidVersionSpec`] when no form matches.
    ///
    /// ```
    /// use tether_plugins::VersionRef;
    ///
    /// assert!(matches!(VersionRef::parse("1.0.0"), Ok(VersionRef::Exact(_))));
    /// assert!(matches!(VersionRef::parse("^1.0.0"), Ok(VersionRef::Range(_))));
    /// assert!(matches!(VersionRef::parse("acme/tools#main"), Ok(VersionRef::Git(_))));
    /// assert!(VersionRef::parse("not a version").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, PluginError> {
        let trimmed = input.trim();
        if let Some(source) = input.strip_prefix("code:") {
            return Ok(Self::Code {
                source: source.to_owned(),
                version: None,
            });
        }
        if let Some(path) = trimmed.strip_prefix("file:") {
            return Ok(Self::Path(PathBuf::from(path)));
        }
        if ["./", "../", "/", "~/"]
            .iter()
            .any(|prefix| trimmed.starts_with(prefix))
        {
            return Ok(Self::Path(PathBuf::from(trimmed)));
        }
        if trimmed.starts_with("github:") || trimmed.contains('/') {
            return GitRef::parse(trimmed).map(Self::Git);
        }
        let bare = trimmed
            .strip_prefix(['v', '='])
            .unwrap_or(trimmed);
        if let Ok(version) = Version::parse(bare) {
            return Ok(Self::Exact(version));
        }
        VersionRange::parse(trimmed).map(Self::Range)
    }

    /// Returns true for [`VersionRef::Range`].
    #[must_use]
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }

    /// Returns the range equivalent of a registry reference.
    ///
    /// Exact versions become single-version ranges. Other variants have no
    /// range form.
    #[must_use]
    pub fn as_range(&self) -> Option<VersionRange> {
        match self {
            Self::Exact(version) => Some(VersionRange::exact(version)),
            Self::Range(range) => Some(range.clone()),
            Self::Git(_) | Self::Path(_) | Self::Code { .. } => None,
        }
    }
}

impl Default for VersionRef {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(version) => write!(f, "{version}"),
            Self::Range(range) => write!(f, "{range}"),
            Self::Git(git) => write!(f, "github:{git}"),
            Self::Path(path) => write!(f, "file:{}", path.display()),
            Self::Code { version, .. } => match version {
                Some(version) => write!(f, "code@{version}"),
                None => f.write_str("code"),
            },
        }
    }
}

impl FromStr for VersionRef {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Version> for VersionRef {
    fn from(version: Version) -> Self {
        Self::Exact(version)
    }
}

impl From<VersionRange> for VersionRef {
    fn from(range: VersionRange) -> Self {
        Self::Range(range)
    }
}

impl From<GitRef> for VersionRef {
    fn from(git: GitRef) -> Self {
        Self::Git(git)
    }
}
