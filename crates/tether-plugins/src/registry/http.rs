//! Blocking HTTP plumbing shared by the registry clients.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::REGISTRY_TARGET;
use crate::error::PluginError;

const DEFAULT_USER_AGENT: &str = concat!("tether/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Credentials sent to a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// `Authorization: Bearer <token>`.
    Token(String),
    /// HTTP basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password, if any.
        password: Option<String>,
    },
}

/// Transport settings for a registry client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Credentials, if the registry requires them.
    pub auth: Option<RegistryAuth>,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RegistryConfig {
    /// Sets the credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = Some(auth);
        self
    }
}

#[derive(Debug, Clone)]
pub(super) struct HttpClient {
    client: Client,
    auth: Option<RegistryAuth>,
}

impl HttpClient {
    pub(super) fn new(config: &RegistryConfig) -> Result<Self, PluginError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|error| PluginError::Registry {
                url: String::from("<client>"),
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            auth: config.auth.clone(),
        })
    }

    /// Fetches `url` and decodes JSON; `Ok(None)` on 404.
    pub(super) fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, PluginError> {
        let Some(response) = self.send(url, query)? else {
            return Ok(None);
        };
        response
            .json::<T>()
            .map(Some)
            .map_err(|error| transport(url, &error))
    }

    /// Fetches `url` as raw bytes.
    pub(super) fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PluginError> {
        let response = self.send(url, &[])?.ok_or_else(|| PluginError::Registry {
            url: url.to_owned(),
            message: String::from("archive not found (HTTP 404)"),
        })?;
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|error| transport(url, &error))
    }

    fn send(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<Response>, PluginError> {
        debug!(target: REGISTRY_TARGET, url, "registry request");
        let response = self
            .authorise(self.client.get(url).query(query))
            .send()
            .map_err(|error| transport(url, &error))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PluginError::Registry {
                url: url.to_owned(),
                message: format!("HTTP {status}"),
            });
        }
        Ok(Some(response))
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(RegistryAuth::Token(token)) => request.bearer_auth(token),
            Some(RegistryAuth::Basic { username, password }) => {
                request.basic_auth(username, password.as_ref())
            }
            None => request,
        }
    }
}

fn transport(url: &str, error: &reqwest::Error) -> PluginError {
    PluginError::Registry {
        url: url.to_owned(),
        message: error.to_string(),
    }
}

/// Joins a base URL and a path without doubling slashes.
pub(super) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
