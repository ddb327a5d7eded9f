//! Install directory resolution.
//!
//! The directory and the way it is written are decided once per run and
//! then held fixed, so an install can never be split between the preferred
//! directory and the user fallback.

use std::ffi::OsStr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};

/// Default system-wide install location.
#[cfg(unix)]
pub const SYSTEM_INSTALL_DIR: &str = "/usr/local/bin";

const PROBE_FILE_PREFIX: &str = ".cfai-installer-probe";

/// How the payload is written into the install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// The current user can write the directory.
    Direct,
    /// The copy goes through `sudo install`.
    Elevated,
}

/// The resolved install location for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDirectory {
    /// Directory that receives the binary.
    pub path: Utf8PathBuf,
    /// Whether a probe write succeeded as the current user.
    pub writable: bool,
    /// Write strategy fixed for the rest of the run.
    pub strategy: WriteStrategy,
}

impl InstallDirectory {
    /// Full path of `file_name` inside this directory.
    #[must_use]
    pub fn target(&self, file_name: &str) -> Utf8PathBuf {
        self.path.join(file_name)
    }
}

/// Inputs to directory resolution.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryRequest<'a> {
    /// Directory to try first.
    pub preferred: &'a Utf8Path,
    /// Whether `sudo` may be used when `preferred` is not writable.
    pub allow_elevation: bool,
    /// Whether the user-scoped directory may be used instead.
    pub allow_fallback: bool,
}

/// Resolve the install directory once.
///
/// Order: the preferred directory when it exists (or can be created) and a
/// probe write succeeds; then the preferred directory through elevation if
/// allowed; then the user bin directory from `dirs`, created if necessary.
///
/// # Errors
///
/// Returns [`InstallerError::InstallWriteFailed`] when no option is usable.
pub fn resolve_install_directory(
    request: &DirectoryRequest<'_>,
    dirs: &dyn BaseDirs,
) -> Result<InstallDirectory> {
    if probe_writable(request.preferred) {
        log::debug!(target: "install_dir", "{} is writable", request.preferred);
        return Ok(InstallDirectory {
            path: request.preferred.to_owned(),
            writable: true,
            strategy: WriteStrategy::Direct,
        });
    }

    if request.allow_elevation {
        log::info!(
            target: "install_dir",
            "{} is not writable; installing with elevated privileges",
            request.preferred
        );
        return Ok(InstallDirectory {
            path: request.preferred.to_owned(),
            writable: false,
            strategy: WriteStrategy::Elevated,
        });
    }

    let not_writable = |reason: String| InstallerError::InstallWriteFailed {
        path: request.preferred.to_owned(),
        reason,
    };

    if !request.allow_fallback {
        return Err(not_writable(
            "directory is not writable; rerun with --elevate".to_owned(),
        ));
    }

    let fallback = dirs
        .bin_dir()
        .ok_or_else(|| not_writable("no user bin directory to fall back to".to_owned()))?;
    let fallback = Utf8PathBuf::from_path_buf(fallback).map_err(|path| {
        not_writable(format!(
            "user bin directory is not valid UTF-8: {}",
            path.display()
        ))
    })?;

    if fallback != request.preferred && probe_writable(&fallback) {
        log::info!(
            target: "install_dir",
            "{} is not writable; falling back to {fallback}",
            request.preferred
        );
        return Ok(InstallDirectory {
            path: fallback,
            writable: true,
            strategy: WriteStrategy::Direct,
        });
    }

    Err(not_writable(format!(
        "directory is not writable and neither is {fallback}; rerun with --elevate or choose --dir"
    )))
}

/// Whether the current user can create files in `dir`, creating it first
/// when missing.
#[must_use]
pub fn probe_writable(dir: &Utf8Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(dir) {
        log::debug!(target: "install_dir", "cannot create {dir}: {e}");
        return false;
    }
    if !dir.is_dir() {
        return false;
    }
    match tempfile::Builder::new()
        .prefix(PROBE_FILE_PREFIX)
        .tempfile_in(dir)
    {
        // The probe file is removed when dropped.
        Ok(_probe) => true,
        Err(e) => {
            log::debug!(target: "install_dir", "probe write in {dir} failed: {e}");
            false
        }
    }
}

/// Whether `dir` is one of the entries of `search_path` (a `PATH` value).
///
/// ```
/// use camino::Utf8Path;
/// use cfai_installer::install_dir::is_on_search_path;
/// use std::ffi::OsStr;
///
/// let path = std::env::join_paths(["/usr/bin", "/opt/bin"]).expect("joinable");
/// assert!(is_on_search_path(Utf8Path::new("/opt/bin"), Some(path.as_os_str())));
/// assert!(!is_on_search_path(Utf8Path::new("/srv/bin"), Some(OsStr::new(""))));
/// ```
#[must_use]
pub fn is_on_search_path(dir: &Utf8Path, search_path: Option<&OsStr>) -> bool {
    search_path.is_some_and(|paths| {
        std::env::split_paths(paths).any(|entry| entry == dir.as_std_path())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirs::MockBaseDirs;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;

    struct Layout {
        _temp: tempfile::TempDir,
        root: Utf8PathBuf,
    }

    #[fixture]
    fn layout() -> Layout {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        Layout { _temp: temp, root }
    }

    fn dirs_with_bin(bin: Option<PathBuf>) -> MockBaseDirs {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_bin_dir().returning(move || bin.clone());
        dirs
    }

    #[cfg(unix)]
    fn is_root() -> bool {
        // SAFETY: geteuid has no preconditions.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(unix)]
    fn read_only_dir(path: &Utf8Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(path).expect("mkdir");
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o555)).expect("chmod");
    }

    #[rstest]
    fn writable_preferred_is_direct(layout: Layout) {
        let preferred = layout.root.join("bin");
        let dirs = dirs_with_bin(None);
        let request = DirectoryRequest {
            preferred: &preferred,
            allow_elevation: false,
            allow_fallback: true,
        };

        let dir = resolve_install_directory(&request, &dirs).expect("resolves");

        assert_eq!(dir.path, preferred);
        assert!(dir.writable);
        assert_eq!(dir.strategy, WriteStrategy::Direct);
        assert!(preferred.is_dir(), "preferred directory is created");
    }

    #[rstest]
    fn probe_leaves_no_files(layout: Layout) {
        assert!(probe_writable(&layout.root));
        let leftovers = std::fs::read_dir(&layout.root).expect("read dir").count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[rstest]
    fn unwritable_preferred_falls_back_once(layout: Layout) {
        if is_root() {
            return;
        }
        let preferred = layout.root.join("system");
        read_only_dir(&preferred);
        let fallback = layout.root.join("home/.local/bin");
        let dirs = dirs_with_bin(Some(fallback.clone().into_std_path_buf()));
        let request = DirectoryRequest {
            preferred: &preferred,
            allow_elevation: false,
            allow_fallback: true,
        };

        let dir = resolve_install_directory(&request, &dirs).expect("resolves");

        assert_eq!(dir.path, fallback);
        assert_eq!(dir.strategy, WriteStrategy::Direct);
        assert!(fallback.is_dir(), "fallback directory is created");
    }

    #[cfg(unix)]
    #[rstest]
    fn elevation_keeps_preferred_directory(layout: Layout) {
        if is_root() {
            return;
        }
        let preferred = layout.root.join("system");
        read_only_dir(&preferred);
        let mut dirs = MockBaseDirs::new();
        dirs.expect_bin_dir().never();
        let request = DirectoryRequest {
            preferred: &preferred,
            allow_elevation: true,
            allow_fallback: true,
        };

        let dir = resolve_install_directory(&request, &dirs).expect("resolves");

        assert_eq!(dir.path, preferred);
        assert!(!dir.writable);
        assert_eq!(dir.strategy, WriteStrategy::Elevated);
    }

    #[cfg(unix)]
    #[rstest]
    fn no_fallback_allowed_is_write_failure(layout: Layout) {
        if is_root() {
            return;
        }
        let preferred = layout.root.join("system");
        read_only_dir(&preferred);
        let dirs = dirs_with_bin(None);
        let request = DirectoryRequest {
            preferred: &preferred,
            allow_elevation: false,
            allow_fallback: false,
        };

        let err = resolve_install_directory(&request, &dirs).expect_err("fails");

        assert!(matches!(err, InstallerError::InstallWriteFailed { .. }));
        assert!(err.to_string().contains("--elevate"));
    }

    #[cfg(unix)]
    #[rstest]
    fn missing_user_dir_is_write_failure(layout: Layout) {
        if is_root() {
            return;
        }
        let preferred = layout.root.join("system");
        read_only_dir(&preferred);
        let dirs = dirs_with_bin(None);
        let request = DirectoryRequest {
            preferred: &preferred,
            allow_elevation: false,
            allow_fallback: true,
        };

        let result = resolve_install_directory(&request, &dirs);
        assert!(matches!(result, Err(InstallerError::InstallWriteFailed { .. })));
    }

    #[rstest]
    fn search_path_membership(layout: Layout) {
        let other = layout.root.join("other");
        let joined = std::env::join_paths([other.as_std_path(), layout.root.as_std_path()])
            .expect("joinable");
        assert!(is_on_search_path(&layout.root, Some(joined.as_os_str())));
        assert!(!is_on_search_path(&layout.root.join("missing"), Some(joined.as_os_str())));
        assert!(!is_on_search_path(&layout.root, None));
    }

    #[rstest]
    fn target_joins_file_name(layout: Layout) {
        let dir = InstallDirectory {
            path: layout.root.clone(),
            writable: true,
            strategy: WriteStrategy::Direct,
        };
        assert_eq!(dir.target("cfai"), layout.root.join("cfai"));
    }
}
