//! Run configuration derived from the command line.
//!
//! Everything environment-dependent (the default install directory, where
//! an installed binary lives) is settled here so the pipeline itself only
//! sees concrete values.

use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cli::{Command, ReleaseArgs};
use crate::dirs::BaseDirs;
use crate::error::Result;
use crate::fetch::MirrorConfig;
use crate::pipeline::{Mode, RunRequest};
use crate::platform::PlatformTag;

/// Binary name implied by a repository: its last path segment.
///
/// ```
/// use cfai_installer::config::default_bin_name;
///
/// assert_eq!(default_bin_name("DoBestone/cfai"), "cfai");
/// ```
#[must_use]
pub fn default_bin_name(repo: &str) -> &str {
    repo.rsplit('/').next().unwrap_or(repo)
}

/// The system install directory on Unix.
///
/// # Errors
///
/// Never fails on Unix.
#[cfg(unix)]
pub fn default_install_dir(_dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    Ok(Utf8PathBuf::from(crate::install_dir::SYSTEM_INSTALL_DIR))
}

/// The user bin directory where no system directory applies.
///
/// # Errors
///
/// Returns [`crate::error::InstallerError::UnsupportedPlatform`] when no
/// user directory can be determined.
#[cfg(not(unix))]
pub fn default_install_dir(dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    use crate::error::InstallerError;

    dirs.bin_dir()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .ok_or_else(|| InstallerError::UnsupportedPlatform {
            reason: "cannot determine a user bin directory; pass --dir".to_owned(),
        })
}

/// Locate the binary an update should replace.
///
/// An explicit `path` wins (a directory is joined with `bin_file`); then a
/// `PATH` lookup through `lookup`; then the first `candidates` directory
/// already holding `bin_file`. `None` means nothing is installed yet.
#[must_use]
pub fn resolve_update_target(
    path: Option<&Utf8Path>,
    bin_file: &str,
    candidates: &[Utf8PathBuf],
    lookup: &dyn Fn(&str) -> Option<PathBuf>,
) -> Option<Utf8PathBuf> {
    if let Some(path) = path {
        return Some(if path.is_dir() {
            path.join(bin_file)
        } else {
            path.to_owned()
        });
    }
    if let Some(found) = lookup(bin_file).and_then(|p| Utf8PathBuf::from_path_buf(p).ok()) {
        log::debug!(target: "config", "found installed binary on PATH at {found}");
        return Some(found);
    }
    candidates
        .iter()
        .map(|dir| dir.join(bin_file))
        .find(|candidate| candidate.is_file())
}

/// Mirror settings from the shared arguments.
#[must_use]
pub fn mirror_config(args: &ReleaseArgs) -> MirrorConfig {
    MirrorConfig {
        base: args.mirror.clone(),
        mode: args.mirror_mode,
        ..MirrorConfig::default()
    }
}

/// Split an install location into its directory and an optional file name.
///
/// An existing directory is used as is. A path ending in `bin_file` or in an
/// `.exe` name is taken as the full path of the binary; anything else names a
/// directory that may not exist yet.
///
/// ```
/// use camino::{Utf8Path, Utf8PathBuf};
/// use cfai_installer::config::split_install_path;
///
/// let (dir, name) = split_install_path(Utf8Path::new("/opt/tools/cfai"), "cfai");
/// assert_eq!(dir, Utf8PathBuf::from("/opt/tools"));
/// assert_eq!(name.as_deref(), Some("cfai"));
///
/// let (dir, name) = split_install_path(Utf8Path::new("/opt/tools/bin"), "cfai");
/// assert_eq!(dir, Utf8PathBuf::from("/opt/tools/bin"));
/// assert!(name.is_none());
/// ```
#[must_use]
pub fn split_install_path(path: &Utf8Path, bin_file: &str) -> (Utf8PathBuf, Option<String>) {
    if path.is_dir() {
        return (path.to_owned(), None);
    }
    let names_binary = path
        .file_name()
        .is_some_and(|name| name == bin_file || name.ends_with(".exe"));
    match (names_binary, path.file_name(), path.parent()) {
        (true, Some(name), Some(parent)) => {
            let parent = if parent.as_str().is_empty() {
                Utf8Path::new(".")
            } else {
                parent
            };
            (parent.to_owned(), Some(name.to_owned()))
        }
        _ => (path.to_owned(), None),
    }
}

/// Build the run request for `command`.
///
/// # Errors
///
/// Returns an error when no install directory can be determined.
pub fn build_request(
    command: &Command,
    platform: PlatformTag,
    dirs: &dyn BaseDirs,
    lookup: &dyn Fn(&str) -> Option<PathBuf>,
) -> Result<RunRequest> {
    let args = command.release_args();
    let product = args
        .bin_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| default_bin_name(&args.repo).to_owned());
    let bin_file = platform.binary_file_name(&product);

    let (mode, dir, file_name, existing) = match command {
        Command::Install(install) => {
            let (dir, file_name) = install
                .dir
                .as_deref()
                .map(|path| split_install_path(path, &bin_file))
                .unzip();
            (Mode::Install, dir, file_name.flatten(), None)
        }
        Command::Update(update) => {
            let dir = update.dir.clone();
            let mut candidates: Vec<Utf8PathBuf> = dir.iter().cloned().collect();
            candidates.push(default_install_dir(dirs)?);
            candidates.extend(
                dirs.bin_dir()
                    .and_then(|bin| Utf8PathBuf::from_path_buf(bin).ok()),
            );
            let existing =
                resolve_update_target(update.path.as_deref(), &bin_file, &candidates, lookup);
            (Mode::Update, dir, None, existing)
        }
    };
    let install_dir = match dir {
        Some(dir) => dir,
        None => default_install_dir(dirs)?,
    };

    Ok(RunRequest {
        mode,
        product,
        platform,
        tag: args.tag.clone(),
        asset: args.asset.clone(),
        tie_break: args.prefer,
        mirror: mirror_config(args),
        install_dir,
        file_name,
        existing,
        elevate: args.elevate,
        force: args.force,
        quiet: args.quiet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{InstallArgs, UpdateArgs};
    use crate::dirs::MockBaseDirs;
    use crate::fetch::MirrorMode;
    use rstest::{fixture, rstest};

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

    fn linux() -> PlatformTag {
        PlatformTag::from_raw("linux", "x86_64").expect("known platform")
    }

    fn no_lookup(_: &str) -> Option<PathBuf> {
        None
    }

    fn dirs_with_bin(bin: &Utf8Path) -> MockBaseDirs {
        let bin = bin.to_owned().into_std_path_buf();
        let mut dirs = MockBaseDirs::new();
        dirs.expect_bin_dir().returning(move || Some(bin.clone()));
        dirs
    }

    #[rstest]
    #[case("DoBestone/cfai", "cfai")]
    #[case("acme/tool", "tool")]
    #[case("flat", "flat")]
    fn bin_name_is_last_segment(#[case] repo: &str, #[case] expected: &str) {
        assert_eq!(default_bin_name(repo), expected);
    }

    #[rstest]
    fn explicit_file_path_is_used_as_is(layout: Layout) {
        let path = layout.root.join("custom-cfai");
        let target = resolve_update_target(Some(&path), "cfai", &[], &no_lookup);
        assert_eq!(target, Some(path));
    }

    #[rstest]
    fn explicit_directory_joins_bin_file(layout: Layout) {
        let target = resolve_update_target(Some(&layout.root), "cfai", &[], &no_lookup);
        assert_eq!(target, Some(layout.root.join("cfai")));
    }

    #[rstest]
    fn path_lookup_precedes_candidates(layout: Layout) {
        let candidate = layout.root.join("bin");
        std::fs::create_dir_all(&candidate).expect("mkdir");
        std::fs::write(candidate.join("cfai"), b"cfai 1.0.0").expect("write");
        let on_path = layout.root.join("elsewhere/cfai");
        let lookup_path = on_path.clone().into_std_path_buf();

        let target = resolve_update_target(None, "cfai", &[candidate], &move |_| {
            Some(lookup_path.clone())
        });

        assert_eq!(target, Some(on_path));
    }

    #[rstest]
    fn first_candidate_with_binary_wins(layout: Layout) {
        let empty = layout.root.join("system");
        let user = layout.root.join("user");
        std::fs::create_dir_all(&empty).expect("mkdir");
        std::fs::create_dir_all(&user).expect("mkdir");
        std::fs::write(user.join("cfai"), b"cfai 1.0.0").expect("write");

        let target = resolve_update_target(None, "cfai", &[empty, user.clone()], &no_lookup);

        assert_eq!(target, Some(user.join("cfai")));
    }

    #[rstest]
    fn nothing_installed_resolves_to_none(layout: Layout) {
        let target = resolve_update_target(None, "cfai", &[layout.root.clone()], &no_lookup);
        assert!(target.is_none());
    }

    #[test]
    fn mirror_config_carries_base_and_mode() {
        let args = ReleaseArgs {
            mirror: Some("https://mirror.example".to_owned()),
            mirror_mode: MirrorMode::Always,
            ..ReleaseArgs::default()
        };
        let config = mirror_config(&args);
        assert_eq!(config.base.as_deref(), Some("https://mirror.example"));
        assert_eq!(config.mode, MirrorMode::Always);
        assert_eq!(config.probe_url, MirrorConfig::default().probe_url);
    }

    #[rstest]
    fn install_request_uses_explicit_dir_and_repo_name(layout: Layout) {
        let command = Command::Install(InstallArgs {
            release: ReleaseArgs {
                repo: "acme/tool".to_owned(),
                tag: Some("v2.0.0".to_owned()),
                force: true,
                ..ReleaseArgs::default()
            },
            dir: Some(layout.root.clone()),
        });
        let dirs = dirs_with_bin(&layout.root);

        let request = build_request(&command, linux(), &dirs, &no_lookup).expect("request");

        assert_eq!(request.mode, Mode::Install);
        assert_eq!(request.product, "tool");
        assert_eq!(request.tag.as_deref(), Some("v2.0.0"));
        assert_eq!(request.install_dir, layout.root);
        assert!(request.existing.is_none());
        assert!(request.force);
    }

    #[rstest]
    #[case::binary_name("tools/cfai", "tools", Some("cfai"))]
    #[case::windows_binary("tools/cfai-dev.exe", "tools", Some("cfai-dev.exe"))]
    #[case::bare_binary("cfai", ".", Some("cfai"))]
    #[case::new_directory("tools/bin", "tools/bin", None)]
    fn install_path_splits_binary_from_directory(
        #[case] given: &str,
        #[case] dir: &str,
        #[case] name: Option<&str>,
    ) {
        let (split_dir, split_name) = split_install_path(Utf8Path::new(given), "cfai");
        assert_eq!(split_dir, Utf8PathBuf::from(dir));
        assert_eq!(split_name.as_deref(), name);
    }

    #[rstest]
    fn existing_directory_named_like_the_binary_stays_a_directory(layout: Layout) {
        let dir = layout.root.join("cfai");
        std::fs::create_dir_all(&dir).expect("mkdir");

        assert_eq!(split_install_path(&dir, "cfai"), (dir, None));
    }

    #[rstest]
    fn install_request_accepts_full_binary_path(layout: Layout) {
        let command = Command::Install(InstallArgs {
            release: ReleaseArgs::default(),
            dir: Some(layout.root.join("opt/cfai")),
        });
        let dirs = dirs_with_bin(&layout.root);

        let request = build_request(&command, linux(), &dirs, &no_lookup).expect("request");

        assert_eq!(request.install_dir, layout.root.join("opt"));
        assert_eq!(request.file_name.as_deref(), Some("cfai"));
    }

    #[rstest]
    fn bin_name_override_wins(layout: Layout) {
        let command = Command::Install(InstallArgs {
            release: ReleaseArgs {
                bin_name: Some("cfai-nightly".to_owned()),
                ..ReleaseArgs::default()
            },
            dir: Some(layout.root.clone()),
        });
        let dirs = dirs_with_bin(&layout.root);

        let request = build_request(&command, linux(), &dirs, &no_lookup).expect("request");

        assert_eq!(request.product, "cfai-nightly");
    }

    #[rstest]
    fn update_request_finds_binary_in_user_dir(layout: Layout) {
        let user_bin = layout.root.join(".local/bin");
        std::fs::create_dir_all(&user_bin).expect("mkdir");
        std::fs::write(user_bin.join("cfai"), b"cfai 1.0.0").expect("write");
        let command = Command::Update(UpdateArgs::default());
        let dirs = dirs_with_bin(&user_bin);

        let request = build_request(&command, linux(), &dirs, &no_lookup).expect("request");

        assert_eq!(request.mode, Mode::Update);
        assert_eq!(request.existing, Some(user_bin.join("cfai")));
    }

    #[cfg(unix)]
    #[rstest]
    fn install_defaults_to_system_dir(layout: Layout) {
        let command = Command::Install(InstallArgs::default());
        let dirs = dirs_with_bin(&layout.root);

        let request = build_request(&command, linux(), &dirs, &no_lookup).expect("request");

        assert_eq!(request.install_dir, Utf8PathBuf::from("/usr/local/bin"));
    }
}
