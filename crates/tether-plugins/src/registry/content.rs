//! Client for npm-style content registries.

use std::collections::BTreeMap;
use std::path::Path;

use semver::Version;
use serde::Deserialize;
use tracing::{debug, info};

use super::http::{HttpClient, join_url};
use super::{REGISTRY_TARGET, Registry, RegistryConfig, archive};
use crate::error::PluginError;
use crate::package::{DEFAULT_MAIN, FetchDescriptor, PackageInfo};
use crate::version::VersionRef;

/// Resolves packages against a registry serving one JSON document per
/// package at `{base_url}/{name}`.
///
/// The document lists every published version under `versions` and the
/// recommended release under `dist-tags.latest`. Ranges accepting any
/// version resolve to `latest` when it satisfies them; all other ranges
/// resolve to the highest satisfying version.
#[derive(Debug, Clone)]
pub struct ContentRegistry {
    base_url: String,
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(default)]
    versions: BTreeMap<String, VersionDocument>,
    #[serde(default, rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VersionDocument {
    name: Option<String>,
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    description: Option<String>,
    dist: DistDocument,
}

#[derive(Debug, Clone, Deserialize)]
struct DistDocument {
    tarball: String,
    #[serde(default)]
    integrity: Option<String>,
}

impl ContentRegistry {
    /// Creates a client for the registry at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] when the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, config: &RegistryConfig) -> Result<Self, PluginError> {
        Ok(Self {
            base_url: base_url.into(),
            http: HttpClient::new(config)?,
        })
    }

    /// Returns the registry base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn document_url(&self, name: &str) -> String {
        join_url(&self.base_url, &name.replace('/', "%2F"))
    }
}

impl Registry for ContentRegistry {
    fn query_package(&self, name: &str, version: &VersionRef) -> Result<PackageInfo, PluginError> {
        let range = version
            .as_range()
            .ok_or_else(|| PluginError::InvalidVersionSpec {
                input: version.to_string(),
                reason: String::from("content registries resolve versions and ranges only"),
            })?;
        let url = self.document_url(name);
        let document: PackageDocument =
            self.http
                .get_json(&url, &[])?
                .ok_or_else(|| PluginError::PackageNotFound {
                    name: name.to_owned(),
                    registry: self.base_url.clone(),
                })?;

        let published: BTreeMap<Version, &VersionDocument> = document
            .versions
            .iter()
            .filter_map(|(key, doc)| Version::parse(key).ok().map(|version| (version, doc)))
            .collect();

        let latest = document
            .dist_tags
            .get("latest")
            .and_then(|tag| Version::parse(tag).ok())
            .filter(|tag| range.is_any() && range.satisfies(tag) && published.contains_key(tag));
        let chosen = latest
            .or_else(|| range.pick_best(published.keys()).cloned())
            .ok_or_else(|| PluginError::NoMatchingVersion {
                name: name.to_owned(),
                requested: range.to_string(),
            })?;
        let Some(doc) = published.get(&chosen) else {
            return Err(PluginError::NoMatchingVersion {
                name: name.to_owned(),
                requested: range.to_string(),
            });
        };
        debug!(target: REGISTRY_TARGET, name, version = %chosen, "resolved package version");

        Ok(PackageInfo {
            name: doc.name.clone().unwrap_or_else(|| name.to_owned()),
            version: chosen,
            dependencies: doc.dependencies.clone(),
            main: doc.main.clone().unwrap_or_else(|| DEFAULT_MAIN.to_owned()),
            description: doc.description.clone(),
            source: FetchDescriptor::Tarball {
                url: doc.dist.tarball.clone(),
                integrity: doc.dist.integrity.clone(),
            },
        })
    }

    fn fetch_package(&self, package: &PackageInfo, destination: &Path) -> Result<(), PluginError> {
        let FetchDescriptor::Tarball { url, .. } = &package.source else {
            return Err(PluginError::Registry {
                url: self.base_url.clone(),
                message: format!("'{}' is not a registry tarball", package.name),
            });
        };
        let bytes = self.http.get_bytes(url)?;
        archive::unpack_tarball(&package.name, &bytes, destination)?;
        info!(
            target: REGISTRY_TARGET,
            name = %package.name,
            version = %package.version,
            destination = %destination.display(),
            "downloaded package"
        );
        Ok(())
    }
}
