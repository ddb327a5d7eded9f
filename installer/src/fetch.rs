//! Mirror-aware asset download.
//!
//! The [`Route`] is decided once per run. A direct route makes a single
//! attempt; a mirror route tries `<mirror-base>/<url>` first and, on
//! failure, retries exactly once against the original URL. A failed
//! attempt never leaves a file behind for the unpacker to pick up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{InstallerError, Result};
use crate::interrupt::CancelToken;
use crate::release::ReleaseAsset;
use crate::transport::{DownloadError, Transport};

/// Endpoint timed by the network-condition probe.
pub const DEFAULT_PROBE_URL: &str = "https://github.com";

/// Probe latency above which the direct path counts as degraded.
pub const DEFAULT_DEGRADED_THRESHOLD: Duration = Duration::from_millis(2000);

/// When to route downloads through the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MirrorMode {
    /// Probe the direct path and use the mirror only when it is degraded.
    #[default]
    Auto,
    /// Always try the mirror first.
    Always,
    /// Never use the mirror.
    Never,
}

impl FromStr for MirrorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "unknown mirror mode \"{other}\" (expected auto, always or never)"
            )),
        }
    }
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        })
    }
}

/// Mirror settings for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Mirror base URL; the original URL is appended after a `/`.
    pub base: Option<String>,
    /// Routing mode.
    pub mode: MirrorMode,
    /// Endpoint timed by the probe.
    pub probe_url: String,
    /// Probe latency classified as degraded.
    pub degraded_threshold: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base: None,
            mode: MirrorMode::Auto,
            probe_url: DEFAULT_PROBE_URL.to_owned(),
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
        }
    }
}

/// The download route held fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Download from the original URL only.
    Direct,
    /// Try the mirror first, then the original URL once.
    Mirror {
        /// Mirror base URL.
        base: String,
    },
}

impl Route {
    /// Decide the route from configuration and, in auto mode, a probe.
    ///
    /// Without a mirror base there is nothing to fail over to, so no probe
    /// is made.
    #[must_use]
    pub fn decide<T: Transport + ?Sized>(config: &MirrorConfig, transport: &T) -> Self {
        let Some(base) = config.base.as_deref().filter(|b| !b.trim().is_empty()) else {
            return Self::Direct;
        };
        let mirror = Self::Mirror {
            base: base.trim_end_matches('/').to_owned(),
        };
        match config.mode {
            MirrorMode::Never => Self::Direct,
            MirrorMode::Always => mirror,
            MirrorMode::Auto => match transport.probe(&config.probe_url) {
                Ok(latency) if latency <= config.degraded_threshold => {
                    log::debug!(target: "fetch", "probe answered in {latency:?}; going direct");
                    Self::Direct
                }
                Ok(latency) => {
                    log::info!(target: "fetch", "probe took {latency:?}; using mirror {base}");
                    mirror
                }
                Err(e) => {
                    log::info!(target: "fetch", "probe failed ({e}); using mirror {base}");
                    mirror
                }
            },
        }
    }

    /// URLs to attempt for `url`, in order.
    ///
    /// ```
    /// use cfai_installer::fetch::Route;
    ///
    /// let route = Route::Mirror { base: "https://mirror.test".to_owned() };
    /// assert_eq!(
    ///     route.attempts("https://github.com/o/r/a.tar.gz"),
    ///     vec![
    ///         "https://mirror.test/https://github.com/o/r/a.tar.gz".to_owned(),
    ///         "https://github.com/o/r/a.tar.gz".to_owned(),
    ///     ]
    /// );
    /// ```
    #[must_use]
    pub fn attempts(&self, url: &str) -> Vec<String> {
        match self {
            Self::Direct => vec![url.to_owned()],
            Self::Mirror { base } => vec![format!("{base}/{url}"), url.to_owned()],
        }
    }
}

/// A downloaded asset ready for unpacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// The asset that was downloaded.
    pub asset: ReleaseAsset,
    /// Where it was written inside the scratch directory.
    pub local_archive_path: PathBuf,
}

/// Downloads assets along a fixed [`Route`].
pub struct Fetcher<'t, T: Transport + ?Sized> {
    transport: &'t T,
    route: Route,
    cancel: CancelToken,
}

impl<'t, T: Transport + ?Sized> Fetcher<'t, T> {
    /// Create a fetcher bound to `route`.
    #[must_use]
    pub fn new(transport: &'t T, route: Route, cancel: CancelToken) -> Self {
        Self {
            transport,
            route,
            cancel,
        }
    }

    /// The route this fetcher uses.
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Download `asset` into `scratch`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::DownloadFailed`] once every attempt on the
    /// route has failed, or [`InstallerError::Interrupted`] if a signal
    /// arrives mid-transfer.
    pub fn fetch(&self, asset: &ReleaseAsset, scratch: &Path) -> Result<ResolvedTarget> {
        let dest = scratch.join(local_file_name(&asset.name));
        let attempted = self.route.attempts(&asset.url);
        let mut last_reason = String::new();

        for (index, url) in attempted.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(InstallerError::Interrupted);
            }
            log::info!(target: "fetch", "downloading {url}");
            match self.transport.download(url, &dest) {
                Ok(bytes) => {
                    log::debug!(
                        target: "fetch",
                        "wrote {bytes} bytes to {} (registry reported {})",
                        dest.display(),
                        asset.size_bytes
                    );
                    return Ok(ResolvedTarget {
                        asset: asset.clone(),
                        local_archive_path: dest,
                    });
                }
                Err(err) => {
                    discard_partial(&dest);
                    if matches!(err, DownloadError::Interrupted) {
                        return Err(InstallerError::Interrupted);
                    }
                    if index + 1 < attempted.len() {
                        log::warn!(target: "fetch", "{err}; retrying against the original URL");
                    }
                    last_reason = err.to_string();
                }
            }
        }

        Err(InstallerError::DownloadFailed {
            asset: asset.name.clone(),
            attempted,
            reason: last_reason,
        })
    }
}

/// Local file name for an asset, keeping only the final path segment.
fn local_file_name(name: &str) -> &str {
    match name.rsplit(['/', '\\']).next() {
        Some(last) if !last.is_empty() && last != ".." && last != "." => last,
        _ => "download",
    }
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            log::warn!(
                target: "fetch",
                "could not remove partial download {}: {e}",
                path.display()
            );
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
