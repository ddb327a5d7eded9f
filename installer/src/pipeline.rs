//! Install and update orchestration.
//!
//! A run moves through fixed stages: release lookup, asset resolution, the
//! version gate (update only), download, unpack, placement and
//! verification. Each stage hands a value to the next or stops the run with
//! an [`InstallerError`] naming it. Downloads and extracted files live in a
//! scratch directory that is removed when the run ends, whatever the
//! outcome, and nothing reaches the install directory before the final
//! placement.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::command::CommandExecutor;
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::extraction::ArchiveExtractor;
use crate::fetch::{Fetcher, MirrorConfig, Route};
use crate::install_dir::{
    DirectoryRequest, InstallDirectory, is_on_search_path, resolve_install_directory,
};
use crate::installer::Installer;
use crate::interrupt::CancelToken;
use crate::output::{
    installed_message, path_hint, progress, up_to_date_message, warning_message, write_stderr_line,
};
use crate::platform::PlatformTag;
use crate::release::{ReleaseAsset, ReleaseInfo, ReleaseRegistry};
use crate::resolver::{AssetQuery, TieBreak, resolve_asset};
use crate::transport::Transport;
use crate::unpack::Unpacker;
use crate::version_gate::{GateDecision, evaluate};

const SCRATCH_PREFIX: &str = "cfai-installer-";

/// Which flow to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// First installation; refuses to overwrite without `force`.
    Install,
    /// Replace an installed binary unless it is already current.
    Update,
}

/// Fully resolved inputs for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Flow to run.
    pub mode: Mode,
    /// Product binary name, also the asset matching token.
    pub product: String,
    /// Platform to select assets for.
    pub platform: PlatformTag,
    /// Release tag to install; `None` means the latest release.
    pub tag: Option<String>,
    /// Exact asset name overriding platform matching.
    pub asset: Option<String>,
    /// Tie-break among several matching assets.
    pub tie_break: TieBreak,
    /// Mirror settings for the route decision.
    pub mirror: MirrorConfig,
    /// Preferred install directory.
    pub install_dir: Utf8PathBuf,
    /// File name to install under instead of the platform's default.
    pub file_name: Option<String>,
    /// Installed binary an update replaces in place, when one was found.
    pub existing: Option<Utf8PathBuf>,
    /// Whether `sudo` may be used for an unwritable directory.
    pub elevate: bool,
    /// Overwrite on install; skip the version gate on update.
    pub force: bool,
    /// Suppress progress lines.
    pub quiet: bool,
}

/// The side-effecting services a run uses.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// HTTP access for the probe and downloads.
    pub transport: &'a dyn Transport,
    /// Release listing source.
    pub registry: &'a dyn ReleaseRegistry,
    /// Archive extraction.
    pub extractor: &'a dyn ArchiveExtractor,
    /// Version queries and `sudo`.
    pub executor: &'a dyn CommandExecutor,
    /// User directories for the install fallback.
    pub dirs: &'a dyn BaseDirs,
    /// Interruption flag polled between stages.
    pub cancel: CancelToken,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A binary was placed.
    Installed {
        /// Final binary path.
        path: Utf8PathBuf,
        /// Release tag that was installed.
        version_tag: String,
        /// Version the new binary reported, if verification succeeded.
        verified: Option<String>,
    },
    /// The installed binary already matched the release.
    UpToDate {
        /// Path of the current binary.
        path: Utf8PathBuf,
        /// Version it reported.
        version: String,
    },
}

/// Run the flow selected by `request.mode`.
///
/// Progress goes to `stderr` unless the request is quiet; the closing
/// result line and warnings are always written.
///
/// # Errors
///
/// Returns the error of the first stage that fails, or
/// [`InstallerError::Interrupted`] when cancellation is observed.
pub fn run(
    request: &RunRequest,
    collaborators: &Collaborators<'_>,
    stderr: &mut dyn Write,
) -> Result<RunOutcome> {
    let mut context = RunContext {
        request,
        with: collaborators,
        stderr,
    };
    let outcome = match request.mode {
        Mode::Install => context.install()?,
        Mode::Update => context.update()?,
    };
    let line = match &outcome {
        RunOutcome::Installed {
            path, version_tag, ..
        } => installed_message(&request.product, version_tag, path),
        RunOutcome::UpToDate { path, version } => {
            up_to_date_message(&request.product, version, path)
        }
    };
    write_stderr_line(context.stderr, line);
    Ok(outcome)
}

struct RunContext<'a, 'w> {
    request: &'a RunRequest,
    with: &'a Collaborators<'a>,
    stderr: &'w mut dyn Write,
}

impl RunContext<'_, '_> {
    fn install(&mut self) -> Result<RunOutcome> {
        let request = self.request;
        let file_name = request
            .file_name
            .clone()
            .unwrap_or_else(|| request.platform.binary_file_name(&request.product));
        let dir = self.resolve_directory(&request.install_dir, true)?;
        let target = dir.target(&file_name);
        if target.exists() && !request.force {
            return Err(InstallerError::TargetExists { path: target });
        }

        let release = self.fetch_release()?;
        let asset = self.resolve(&release)?;
        self.deliver(asset, &release.version_tag, &dir, &file_name)
    }

    fn update(&mut self) -> Result<RunOutcome> {
        let request = self.request;
        let bin_file = request.platform.binary_file_name(&request.product);
        let release = self.fetch_release()?;
        let asset = self.resolve(&release)?;

        let gate_target = request
            .existing
            .clone()
            .unwrap_or_else(|| request.install_dir.join(&bin_file));
        if request.force {
            log::info!(target: "pipeline", "--force given; skipping the version check");
        } else if let Some(version) = self.gate(&gate_target, &release.version_tag)? {
            return Ok(RunOutcome::UpToDate {
                path: gate_target,
                version,
            });
        }

        let (dir, file_name) = match &request.existing {
            Some(existing) => {
                let parent = existing
                    .parent()
                    .filter(|parent| !parent.as_str().is_empty())
                    .unwrap_or_else(|| Utf8Path::new("."));
                let file_name = existing.file_name().unwrap_or(bin_file.as_str()).to_owned();
                (self.resolve_directory(parent, false)?, file_name)
            }
            None => (self.resolve_directory(&request.install_dir, true)?, bin_file),
        };
        self.deliver(asset, &release.version_tag, &dir, &file_name)
    }

    /// The installed version when the gate says the target is current.
    fn gate(&mut self, target: &Utf8Path, latest_tag: &str) -> Result<Option<String>> {
        self.checkpoint()?;
        match evaluate(self.with.executor, target, latest_tag) {
            GateDecision::UpToDate { version } => Ok(Some(version)),
            GateDecision::Proceed {
                installed: Some(installed),
            } => {
                self.say(format!("Updating {target} from {installed} to {latest_tag}"));
                Ok(None)
            }
            GateDecision::Proceed { installed: None } => Ok(None),
        }
    }

    fn fetch_release(&mut self) -> Result<ReleaseInfo> {
        self.checkpoint()?;
        let wanted = self.request.tag.as_deref().unwrap_or("latest");
        self.say(format!("Fetching {} release information ({wanted})", self.request.product));
        let release = self.with.registry.release(self.request.tag.as_deref())?;
        log::info!(
            target: "pipeline",
            "release {} lists {} asset(s)",
            release.version_tag,
            release.assets.len()
        );
        Ok(release)
    }

    fn resolve<'r>(&self, release: &'r ReleaseInfo) -> Result<&'r ReleaseAsset> {
        let request = self.request;
        let query = AssetQuery::new(&request.product, request.platform)
            .with_tie_break(request.tie_break)
            .with_explicit(request.asset.as_deref());
        let asset = resolve_asset(release, &query)?;
        log::info!(target: "pipeline", "selected asset {}", asset.name);
        Ok(asset)
    }

    fn resolve_directory(
        &self,
        preferred: &Utf8Path,
        allow_fallback: bool,
    ) -> Result<InstallDirectory> {
        let request = DirectoryRequest {
            preferred,
            allow_elevation: self.request.elevate,
            allow_fallback,
        };
        resolve_install_directory(&request, self.with.dirs)
    }

    fn deliver(
        &mut self,
        asset: &ReleaseAsset,
        version_tag: &str,
        dir: &InstallDirectory,
        file_name: &str,
    ) -> Result<RunOutcome> {
        self.checkpoint()?;
        let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;

        let route = Route::decide(&self.request.mirror, self.with.transport);
        if let Route::Mirror { base } = &route {
            self.say(format!("Network looks degraded; downloading through {base}"));
        }
        self.say(format!("Downloading {} ({} bytes)", asset.name, asset.size_bytes));
        let fetcher = Fetcher::new(self.with.transport, route, self.with.cancel);
        let target = fetcher.fetch(asset, scratch.path())?;

        self.checkpoint()?;
        let payload = Unpacker::new(
            self.with.extractor,
            &self.request.product,
            self.request.platform,
        )
        .unpack(&target, scratch.path())?;

        self.checkpoint()?;
        self.say(format!("Installing to {}", dir.target(file_name)));
        let installer = Installer::new(self.with.executor);
        let path = installer.install(&payload, dir, file_name)?;

        let verified = match installer.verify(&path) {
            Ok(version) => Some(version),
            Err(err) => {
                log::warn!(target: "pipeline", "{err}");
                write_stderr_line(self.stderr, warning_message(&err));
                None
            }
        };
        if !is_on_search_path(&dir.path, std::env::var_os("PATH").as_deref()) {
            self.say(path_hint(&dir.path));
        }

        Ok(RunOutcome::Installed {
            path,
            version_tag: version_tag.to_owned(),
            verified,
        })
    }

    fn checkpoint(&self) -> Result<()> {
        if self.with.cancel.is_cancelled() {
            return Err(InstallerError::Interrupted);
        }
        Ok(())
    }

    fn say(&mut self, message: impl std::fmt::Display) {
        progress(self.stderr, self.request.quiet, message);
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
