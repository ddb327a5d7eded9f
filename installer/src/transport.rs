//! HTTP transport for registry queries, downloads, and network probes.
//!
//! Provides a trait-based abstraction over `ureq` so the fetcher and the
//! registry client can be exercised in tests without network access.

use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::interrupt::{CancelToken, CopyError, copy_interruptible};

/// Bound on establishing a connection. Transfers themselves are unbounded
/// so that large binaries on slow links are not cut off.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connect and overall bound for the network-condition probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const USER_AGENT: &str = concat!("cfai-installer/", env!("CARGO_PKG_VERSION"));

/// Trait for the HTTP operations the installer needs.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Fetch a URL and return the body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not text.
    fn get_text(&self, url: &str) -> Result<String, DownloadError>;

    /// Download a URL into `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the request, the transfer, or the file write
    /// fails. `dest` may hold a partial file afterwards.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;

    /// Time a lightweight request to `url`.
    ///
    /// Any HTTP response counts as reachable.
    ///
    /// # Errors
    ///
    /// Returns an error when no response arrives within the probe timeout.
    fn probe(&self, url: &str) -> Result<Duration, DownloadError>;
}

/// Errors arising from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("request to {url} failed: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested resource was not found (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),

    /// The transfer was abandoned because of a signal.
    #[error("transfer interrupted")]
    Interrupted,
}

impl From<CopyError> for DownloadError {
    fn from(err: CopyError) -> Self {
        match err {
            CopyError::Io(e) => Self::Io(e),
            CopyError::Interrupted => Self::Interrupted,
        }
    }
}

/// Production transport backed by `ureq` agents.
pub struct HttpTransport {
    agent: ureq::Agent,
    probe_agent: ureq::Agent,
    cancel: CancelToken,
}

impl HttpTransport {
    /// Create a transport that polls `cancel` while copying bodies.
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build();
        let probe_config = ureq::Agent::config_builder()
            .timeout_connect(Some(PROBE_TIMEOUT))
            .timeout_global(Some(PROBE_TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            probe_agent: ureq::Agent::new_with_config(probe_config),
            cancel,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(CancelToken::global())
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| DownloadError::HttpError {
                url: url.to_owned(),
                reason: e.to_string(),
            })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let mut file = File::create(dest)?;
        let mut reader = response.into_body().into_reader();
        let written = copy_interruptible(&mut reader, &mut file, self.cancel)?;
        file.sync_all()?;
        Ok(written)
    }

    fn probe(&self, url: &str) -> Result<Duration, DownloadError> {
        let started = Instant::now();
        match self
            .probe_agent
            .head(url)
            .header("User-Agent", USER_AGENT)
            .call()
        {
            Ok(_) | Err(ureq::Error::StatusCode(_)) => Ok(started.elapsed()),
            Err(e) => Err(map_ureq_error(url, &e)),
        }
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
