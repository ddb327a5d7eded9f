//! Final placement and verification of the payload.
//!
//! This is the only step that touches the install location. A direct write
//! goes to a temporary file inside the install directory and is renamed
//! over the target, so the target is either the old binary or the new one.
//! An elevated write delegates the copy to `sudo install`.

use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};

use crate::command::CommandExecutor;
use crate::error::{InstallerError, Result};
use crate::install_dir::{InstallDirectory, WriteStrategy};
use crate::unpack::InstalledExecutable;
use crate::version_gate::query_version;

/// Mode applied to installed binaries.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Places payloads and verifies the result.
pub struct Installer<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> Installer<'a> {
    /// Create an installer that runs `sudo` and version queries through
    /// `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Copy `payload` to `<dir>/<file_name>` using the directory's strategy.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InstallWriteFailed`] if the copy fails.
    pub fn install(
        &self,
        payload: &InstalledExecutable,
        dir: &InstallDirectory,
        file_name: &str,
    ) -> Result<Utf8PathBuf> {
        let target = dir.target(file_name);
        let source = Utf8Path::from_path(&payload.path).ok_or_else(|| {
            InstallerError::InstallWriteFailed {
                path: target.clone(),
                reason: format!("payload path is not valid UTF-8: {}", payload.path.display()),
            }
        })?;
        log::info!(
            target: "installer",
            "installing {source} to {target} ({:?})",
            dir.strategy
        );
        match dir.strategy {
            WriteStrategy::Direct => install_direct(source, &dir.path, &target)?,
            WriteStrategy::Elevated => self.install_elevated(source, &dir.path, &target)?,
        }
        Ok(target)
    }

    fn install_elevated(&self, source: &Utf8Path, dir: &Utf8Path, target: &Utf8Path) -> Result<()> {
        if !dir.is_dir() {
            self.sudo(&["mkdir", "-p", dir.as_str()], target)?;
        }
        self.sudo(&["install", "-m", "755", source.as_str(), target.as_str()], target)
    }

    fn sudo(&self, args: &[&str], target: &Utf8Path) -> Result<()> {
        let output = self
            .executor
            .run("sudo", args)
            .map_err(|e| InstallerError::InstallWriteFailed {
                path: target.to_owned(),
                reason: format!("could not run sudo: {e}"),
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(InstallerError::InstallWriteFailed {
            path: target.to_owned(),
            reason: format!(
                "sudo {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }

    /// Confirm the installed binary answers its version query.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::VerificationInconclusive`] when the query
    /// fails or yields nothing parseable; callers treat it as a warning.
    pub fn verify(&self, installed: &Utf8Path) -> Result<String> {
        query_version(self.executor, installed).ok_or_else(|| {
            InstallerError::VerificationInconclusive {
                path: installed.to_owned(),
                reason: "`--version` produced no recognizable version".to_owned(),
            }
        })
    }
}

fn install_direct(source: &Utf8Path, dir: &Utf8Path, target: &Utf8Path) -> Result<()> {
    let write_failed = |reason: String| InstallerError::InstallWriteFailed {
        path: target.to_owned(),
        reason,
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".cfai-installer-")
        .tempfile_in(dir)
        .map_err(|e| write_failed(format!("cannot stage in {dir}: {e}")))?;
    let mut reader =
        File::open(source).map_err(|e| write_failed(format!("cannot read payload: {e}")))?;
    std::io::copy(&mut reader, staged.as_file_mut())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| write_failed(format!("cannot write binary: {e}")))?;
    set_executable(staged.as_file()).map_err(|e| write_failed(format!("cannot set mode: {e}")))?;
    staged
        .persist(target)
        .map_err(|e| write_failed(format!("cannot replace binary: {}", e.error)))?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(EXECUTABLE_MODE))
}

#[cfg(not(unix))]
fn set_executable(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;
