//! Release registry client.
//!
//! Queries the GitHub REST API for a release and its attached assets. Only
//! the fields the installer consumes are deserialized.

use serde::Deserialize;

use crate::error::{InstallerError, Result};
use crate::transport::Transport;

/// Default registry API base.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// File name as published.
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub url: String,
    /// Reported size in bytes.
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// One published release and its assets in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    /// The release tag, e.g. `v1.2.3`.
    #[serde(rename = "tag_name")]
    pub version_tag: String,
    /// Attached assets.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Source of release metadata.
pub trait ReleaseRegistry {
    /// Fetch the latest release, or the release for `tag` when given.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::RegistryUnavailable`] when the query or
    /// decoding fails.
    fn release(&self, tag: Option<&str>) -> Result<ReleaseInfo>;
}

/// Registry client for the GitHub releases API.
pub struct GithubRegistry<'t, T: Transport + ?Sized> {
    transport: &'t T,
    api_url: String,
    repo: String,
}

impl<'t, T: Transport + ?Sized> GithubRegistry<'t, T> {
    /// Create a client for `repo` (`owner/name`) against `api_url`.
    #[must_use]
    pub fn new(transport: &'t T, api_url: &str, repo: &str) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_owned(),
            repo: repo.to_owned(),
        }
    }

    /// Endpoint URL for the latest release or a pinned tag.
    ///
    /// ```
    /// use cfai_installer::release::GithubRegistry;
    /// use cfai_installer::transport::HttpTransport;
    ///
    /// let transport = HttpTransport::default();
    /// let registry = GithubRegistry::new(&transport, "https://api.github.com/", "DoBestone/cfai");
    /// assert_eq!(
    ///     registry.endpoint(None),
    ///     "https://api.github.com/repos/DoBestone/cfai/releases/latest"
    /// );
    /// ```
    #[must_use]
    pub fn endpoint(&self, tag: Option<&str>) -> String {
        let base = format!("{}/repos/{}/releases", self.api_url, self.repo);
        tag.map_or_else(
            || format!("{base}/latest"),
            |tag| format!("{base}/tags/{tag}"),
        )
    }

    fn unavailable(&self, reason: String) -> InstallerError {
        InstallerError::RegistryUnavailable {
            repo: self.repo.clone(),
            reason,
        }
    }
}

impl<T: Transport + ?Sized> ReleaseRegistry for GithubRegistry<'_, T> {
    fn release(&self, tag: Option<&str>) -> Result<ReleaseInfo> {
        let url = self.endpoint(tag);
        log::debug!(target: "release", "querying {url}");
        let body = self
            .transport
            .get_text(&url)
            .map_err(|e| self.unavailable(e.to_string()))?;
        let info: ReleaseInfo = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("malformed release response: {e}")))?;
        log::info!(
            target: "release",
            "release {} lists {} assets",
            info.version_tag,
            info.assets.len()
        );
        Ok(info)
    }
}
