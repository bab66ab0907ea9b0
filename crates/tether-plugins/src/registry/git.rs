//! Client for GitHub-style repository APIs.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::info;

use super::http::{HttpClient, join_url};
use super::{REGISTRY_TARGET, Registry, RegistryConfig, archive};
use crate::error::PluginError;
use crate::package::{DESCRIPTOR_FILE, FetchDescriptor, PackageDescriptor, PackageInfo};
use crate::version::{GitRef, VersionRef};

/// Reads package descriptors and snapshots from a git hosting API.
///
/// The descriptor comes from
/// `{api}/repos/{owner}/{repo}/contents/package.json`, whose `content`
/// field is base64. The snapshot comes from
/// `{api}/repos/{owner}/{repo}/tarball[/{ref}]`. A missing reference means
/// the repository's default branch.
#[derive(Debug, Clone)]
pub struct GitRegistry {
    api_url: String,
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct ContentsDocument {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

impl GitRegistry {
    /// Creates a client for the API at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] when the HTTP client cannot be
    /// built.
    pub fn new(api_url: impl Into<String>, config: &RegistryConfig) -> Result<Self, PluginError> {
        Ok(Self {
            api_url: api_url.into(),
            http: HttpClient::new(config)?,
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn repo_url(&self, git: &GitRef, suffix: &str) -> String {
        join_url(
            &self.api_url,
            &format!("repos/{}/{}/{suffix}", git.owner, git.repo),
        )
    }

    fn tarball_url(&self, git: &GitRef) -> String {
        match &git.reference {
            Some(reference) => self.repo_url(git, &format!("tarball/{reference}")),
            None => self.repo_url(git, "tarball"),
        }
    }
}

impl Registry for GitRegistry {
    fn query_package(&self, name: &str, version: &VersionRef) -> Result<PackageInfo, PluginError> {
        let VersionRef::Git(git) = version else {
            return Err(PluginError::InvalidVersionSpec {
                input: version.to_string(),
                reason: String::from("git registries resolve owner/repo references only"),
            });
        };
        let url = self.repo_url(git, &format!("contents/{DESCRIPTOR_FILE}"));
        let query: Vec<(&str, &str)> = git
            .reference
            .as_deref()
            .map(|reference| ("ref", reference))
            .into_iter()
            .collect();
        let document: ContentsDocument =
            self.http
                .get_json(&url, &query)?
                .ok_or_else(|| PluginError::PackageNotFound {
                    name: if name.is_empty() { git.to_string() } else { name.to_owned() },
                    registry: format!("{} ({git})", self.api_url),
                })?;

        let text = decode_content(&document, &url)?;
        let descriptor = PackageDescriptor::from_json(&text, Path::new(&url))?;
        PackageInfo::from_descriptor(
            descriptor,
            FetchDescriptor::GitTarball {
                url: self.tarball_url(git),
                git: git.clone(),
            },
            Path::new(&url),
        )
    }

    fn fetch_package(&self, package: &PackageInfo, destination: &Path) -> Result<(), PluginError> {
        let FetchDescriptor::GitTarball { url, git } = &package.source else {
            return Err(PluginError::Registry {
                url: self.api_url.clone(),
                message: format!("'{}' is not a git snapshot", package.name),
            });
        };
        let bytes = self.http.get_bytes(url)?;
        archive::unpack_tarball(&package.name, &bytes, destination)?;
        info!(
            target: REGISTRY_TARGET,
            name = %package.name,
            repository = %git,
            destination = %destination.display(),
            "downloaded repository snapshot"
        );
        Ok(())
    }
}

fn decode_content(document: &ContentsDocument, url: &str) -> Result<String, PluginError> {
    let malformed = |message: String| PluginError::Descriptor {
        path: url.into(),
        message,
    };
    if let Some(encoding) = document.encoding.as_deref()
        && encoding != "base64"
    {
        return Err(malformed(format!("unsupported content encoding '{encoding}'")));
    }
    let compact: String = document
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|error| malformed(error.to_string()))?;
    String::from_utf8(bytes).map_err(|error| malformed(error.to_string()))
}
