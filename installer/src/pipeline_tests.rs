//! Tests for the install and update flows.

use super::*;
use crate::dirs::MockBaseDirs;
use crate::extraction::PackageExtractor;
use crate::fetch::MirrorMode;
use crate::test_utils::{
    FakeTransport, FileEchoExecutor, FixedRegistry, asset_url, synthetic_release, tar_gz_bytes,
};
use rstest::{fixture, rstest};
use std::sync::atomic::AtomicBool;

const TAG: &str = "v1.2.3";
const LINUX_ASSET: &str = "cfai-linux-amd64.tar.gz";

struct Scene {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    bin: Utf8PathBuf,
}

#[fixture]
fn scene() -> Scene {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
    let bin = root.join("bin");
    Scene {
        _temp: temp,
        root,
        bin,
    }
}

fn linux() -> PlatformTag {
    PlatformTag::from_raw("linux", "x86_64").expect("known platform")
}

fn fresh_token() -> CancelToken {
    CancelToken::from_flag(Box::leak(Box::new(AtomicBool::new(false))))
}

fn release() -> ReleaseInfo {
    synthetic_release(
        TAG,
        &[
            ("cfai-darwin-arm64.tar.gz", 900),
            (LINUX_ASSET, 1000),
            ("checksums.txt", 64),
        ],
    )
}

fn packaged_binary() -> Vec<u8> {
    tar_gz_bytes(&[
        ("cfai-v1.2.3/bin/cfai", b"cfai 1.2.3\n"),
        ("cfai-v1.2.3/bin/cfai.txt", b"release notes"),
        ("cfai-v1.2.3/README.md", b"# cfai"),
    ])
}

fn serving_transport() -> FakeTransport {
    FakeTransport::new().with_body(&asset_url(TAG, LINUX_ASSET), packaged_binary())
}

fn request(mode: Mode, scene: &Scene) -> RunRequest {
    RunRequest {
        mode,
        product: "cfai".to_owned(),
        platform: linux(),
        tag: None,
        asset: None,
        tie_break: TieBreak::LargestSize,
        mirror: MirrorConfig::default(),
        install_dir: scene.bin.clone(),
        file_name: None,
        existing: None,
        elevate: false,
        force: false,
        quiet: false,
    }
}

fn no_fallback_dirs() -> MockBaseDirs {
    let mut dirs = MockBaseDirs::new();
    dirs.expect_bin_dir().returning(|| None);
    dirs
}

struct Harness {
    scratch_root: tempfile::TempDir,
    transport: FakeTransport,
    registry: FixedRegistry,
    extractor: PackageExtractor,
    executor: FileEchoExecutor,
    dirs: MockBaseDirs,
    cancel: CancelToken,
}

impl Harness {
    fn new(transport: FakeTransport) -> Self {
        let cancel = fresh_token();
        Self {
            scratch_root: tempfile::tempdir().expect("scratch root"),
            transport,
            registry: FixedRegistry::new(release()),
            extractor: PackageExtractor::new(cancel),
            executor: FileEchoExecutor::new(),
            dirs: no_fallback_dirs(),
            cancel,
        }
    }

    fn with_registry(mut self, registry: FixedRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn run(&self, request: &RunRequest) -> (Result<RunOutcome>, String) {
        let collaborators = Collaborators {
            transport: &self.transport,
            registry: &self.registry,
            extractor: &self.extractor,
            executor: &self.executor,
            dirs: &self.dirs,
            cancel: self.cancel,
        };
        let mut stderr = Vec::new();
        // Scratch directories land under this harness's own root.
        let result = temp_env::with_var("TMPDIR", Some(self.scratch_root.path()), || {
            run(request, &collaborators, &mut stderr)
        });
        (result, String::from_utf8(stderr).expect("UTF-8 stderr"))
    }

    fn leftover_scratch(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch_root.path())
            .expect("read scratch root")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(SCRATCH_PREFIX))
            .collect()
    }

    fn version_queries(&self) -> usize {
        self.executor
            .calls()
            .iter()
            .filter(|call| call.get(1).is_some_and(|arg| arg == "--version"))
            .count()
    }
}

#[rstest]
fn install_places_and_verifies_binary(scene: Scene) {
    let harness = Harness::new(serving_transport());

    let (result, stderr) = harness.run(&request(Mode::Install, &scene));

    let installed = scene.bin.join("cfai");
    assert_eq!(
        result.expect("install succeeds"),
        RunOutcome::Installed {
            path: installed.clone(),
            version_tag: TAG.to_owned(),
            verified: Some("1.2.3".to_owned()),
        }
    );
    assert_eq!(std::fs::read(&installed).expect("read"), b"cfai 1.2.3\n");
    assert_eq!(harness.transport.downloads(), vec![asset_url(TAG, LINUX_ASSET)]);
    assert_eq!(harness.transport.probes(), 0, "no mirror means no probe");
    assert!(stderr.contains(&format!("Installed cfai {TAG} to {installed}")));
}

#[rstest]
fn install_leaves_only_the_binary(scene: Scene) {
    let harness = Harness::new(serving_transport());

    harness
        .run(&request(Mode::Install, &scene))
        .0
        .expect("install succeeds");

    let names: Vec<String> = std::fs::read_dir(&scene.bin)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cfai".to_owned()]);
}

#[rstest]
fn install_refuses_existing_binary_before_download(scene: Scene) {
    std::fs::create_dir_all(&scene.bin).expect("mkdir");
    std::fs::write(scene.bin.join("cfai"), b"cfai 1.0.0\n").expect("write");
    let harness = Harness::new(serving_transport());

    let (result, _) = harness.run(&request(Mode::Install, &scene));

    let err = result.expect_err("install refuses");
    assert!(matches!(err, InstallerError::TargetExists { .. }));
    assert_eq!(harness.registry.queries(), 0);
    assert!(harness.transport.downloads().is_empty());
    assert_eq!(
        std::fs::read(scene.bin.join("cfai")).expect("read"),
        b"cfai 1.0.0\n"
    );
}

#[rstest]
fn forced_install_overwrites(scene: Scene) {
    std::fs::create_dir_all(&scene.bin).expect("mkdir");
    std::fs::write(scene.bin.join("cfai"), b"cfai 1.0.0\n").expect("write");
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        force: true,
        ..request(Mode::Install, &scene)
    };

    harness.run(&request).0.expect("install succeeds");

    assert_eq!(
        std::fs::read(scene.bin.join("cfai")).expect("read"),
        b"cfai 1.2.3\n"
    );
}

#[rstest]
fn update_of_current_binary_is_a_no_op(scene: Scene) {
    std::fs::create_dir_all(&scene.bin).expect("mkdir");
    let existing = scene.bin.join("cfai");
    std::fs::write(&existing, b"cfai 1.2.3\n").expect("write");
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        existing: Some(existing.clone()),
        ..request(Mode::Update, &scene)
    };

    let (result, stderr) = harness.run(&request);

    assert_eq!(
        result.expect("update succeeds"),
        RunOutcome::UpToDate {
            path: existing,
            version: "1.2.3".to_owned(),
        }
    );
    assert!(harness.transport.downloads().is_empty());
    assert!(stderr.contains("already up to date"));
}

#[rstest]
fn update_of_older_binary_replaces_it_in_place(scene: Scene) {
    let custom = scene.root.join("tools");
    std::fs::create_dir_all(&custom).expect("mkdir");
    let existing = custom.join("cfai");
    std::fs::write(&existing, b"cfai 1.2.2\n").expect("write");
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        existing: Some(existing.clone()),
        ..request(Mode::Update, &scene)
    };

    let (result, stderr) = harness.run(&request);

    let outcome = result.expect("update succeeds");
    assert!(matches!(outcome, RunOutcome::Installed { ref path, .. } if *path == existing));
    assert_eq!(std::fs::read(&existing).expect("read"), b"cfai 1.2.3\n");
    assert!(!scene.bin.exists(), "the default directory is not touched");
    assert!(stderr.contains("from 1.2.2 to v1.2.3"));
}

#[rstest]
fn forced_update_skips_the_gate(scene: Scene) {
    std::fs::create_dir_all(&scene.bin).expect("mkdir");
    let existing = scene.bin.join("cfai");
    std::fs::write(&existing, b"cfai 1.2.3\n").expect("write");
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        existing: Some(existing),
        force: true,
        ..request(Mode::Update, &scene)
    };

    let outcome = harness.run(&request).0.expect("update succeeds");

    assert!(matches!(outcome, RunOutcome::Installed { .. }));
    assert_eq!(harness.version_queries(), 1, "only the post-install check runs");
    assert_eq!(harness.transport.downloads().len(), 1);
}

#[rstest]
fn update_without_installed_binary_installs(scene: Scene) {
    let harness = Harness::new(serving_transport());

    let outcome = harness
        .run(&request(Mode::Update, &scene))
        .0
        .expect("update succeeds");

    assert!(matches!(outcome, RunOutcome::Installed { .. }));
    assert!(scene.bin.join("cfai").is_file());
}

#[rstest]
fn install_then_update_downloads_once(scene: Scene) {
    let harness = Harness::new(serving_transport());
    harness
        .run(&request(Mode::Install, &scene))
        .0
        .expect("install succeeds");

    let update = RunRequest {
        existing: Some(scene.bin.join("cfai")),
        ..request(Mode::Update, &scene)
    };
    let outcome = harness.run(&update).0.expect("update succeeds");

    assert!(matches!(outcome, RunOutcome::UpToDate { .. }));
    assert_eq!(harness.transport.downloads().len(), 1);
}

#[rstest]
fn degraded_network_tries_mirror_then_direct(scene: Scene) {
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        mirror: MirrorConfig {
            base: Some("https://mirror.example".to_owned()),
            mode: MirrorMode::Auto,
            ..MirrorConfig::default()
        },
        ..request(Mode::Install, &scene)
    };

    let (result, stderr) = harness.run(&request);

    result.expect("install succeeds through direct retry");
    let direct = asset_url(TAG, LINUX_ASSET);
    assert_eq!(
        harness.transport.downloads(),
        vec![format!("https://mirror.example/{direct}"), direct]
    );
    assert_eq!(harness.transport.probes(), 1);
    assert!(stderr.contains("through https://mirror.example"));
}

#[rstest]
fn failed_download_leaves_install_directory_untouched(scene: Scene) {
    let harness = Harness::new(FakeTransport::new());

    let (result, _) = harness.run(&request(Mode::Install, &scene));

    let err = result.expect_err("download fails");
    assert!(matches!(err, InstallerError::DownloadFailed { .. }));
    assert!(!scene.bin.join("cfai").exists());
}

#[rstest]
fn unmatched_release_is_asset_not_found(scene: Scene) {
    let registry = FixedRegistry::new(synthetic_release(TAG, &[("other-windows-x64.zip", 10)]));
    let harness = Harness::new(serving_transport()).with_registry(registry);

    let (result, _) = harness.run(&request(Mode::Install, &scene));

    assert!(matches!(result, Err(InstallerError::AssetNotFound { .. })));
    assert!(harness.transport.downloads().is_empty());
}

#[rstest]
fn explicit_asset_bypasses_matching(scene: Scene) {
    let transport = FakeTransport::new()
        .with_body(&asset_url(TAG, "cfai-darwin-arm64.tar.gz"), packaged_binary());
    let harness = Harness::new(transport);
    let request = RunRequest {
        asset: Some("cfai-darwin-arm64.tar.gz".to_owned()),
        ..request(Mode::Install, &scene)
    };

    harness.run(&request).0.expect("install succeeds");

    assert_eq!(
        harness.transport.downloads(),
        vec![asset_url(TAG, "cfai-darwin-arm64.tar.gz")]
    );
}

#[rstest]
fn raw_asset_is_installed_as_is(scene: Scene) {
    let registry = FixedRegistry::new(synthetic_release(TAG, &[("cfai-linux-x86_64", 11)]));
    let transport = FakeTransport::new().with_body(
        &asset_url(TAG, "cfai-linux-x86_64"),
        b"cfai 1.2.3\n".to_vec(),
    );
    let harness = Harness::new(transport).with_registry(registry);

    harness
        .run(&request(Mode::Install, &scene))
        .0
        .expect("install succeeds");

    assert_eq!(
        std::fs::read(scene.bin.join("cfai")).expect("read"),
        b"cfai 1.2.3\n"
    );
}

#[rstest]
fn unverifiable_binary_still_succeeds_with_warning(scene: Scene) {
    let transport = FakeTransport::new().with_body(
        &asset_url(TAG, LINUX_ASSET),
        tar_gz_bytes(&[("cfai", b"no version here\n")]),
    );
    let harness = Harness::new(transport);

    let (result, stderr) = harness.run(&request(Mode::Install, &scene));

    assert!(matches!(
        result.expect("install succeeds"),
        RunOutcome::Installed { verified: None, .. }
    ));
    assert!(stderr.contains("warning:"));
}

#[rstest]
fn interruption_stops_before_any_download(scene: Scene) {
    let harness = Harness::new(serving_transport());
    harness.cancel.cancel();

    let (result, _) = harness.run(&request(Mode::Install, &scene));

    let err = result.expect_err("interrupted");
    assert!(matches!(err, InstallerError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert!(harness.transport.downloads().is_empty());
    assert!(!scene.bin.join("cfai").exists());
}

#[rstest]
fn quiet_run_prints_only_the_result(scene: Scene) {
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        quiet: true,
        ..request(Mode::Install, &scene)
    };

    let (result, stderr) = harness.run(&request);

    result.expect("install succeeds");
    assert_eq!(stderr.lines().count(), 1, "unexpected output: {stderr}");
    assert!(stderr.starts_with("Installed cfai"));
}

#[rstest]
fn pinned_tag_is_passed_to_registry(scene: Scene) {
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        tag: Some("v0.9.0".to_owned()),
        ..request(Mode::Install, &scene)
    };

    let (result, _) = harness.run(&request);

    assert!(matches!(result, Err(InstallerError::RegistryUnavailable { .. })));
    assert_eq!(harness.registry.queries(), 1);
}

fn transport_serving(body: &[u8]) -> FakeTransport {
    FakeTransport::new().with_body(&asset_url(TAG, LINUX_ASSET), body.to_vec())
}

#[rstest]
#[case::success(serving_transport(), None)]
#[case::corrupt_archive(transport_serving(b"not a gzip stream"), Some("extraction"))]
#[case::no_payload(
    transport_serving(&tar_gz_bytes(&[("cfai-v1.2.3/README.md", b"# cfai")])),
    Some("payload search")
)]
#[case::download_refused(
    serving_transport().failing(&asset_url(TAG, LINUX_ASSET)),
    Some("download")
)]
fn scratch_directory_is_removed_on_every_exit(
    scene: Scene,
    #[case] transport: FakeTransport,
    #[case] failed_stage: Option<&str>,
) {
    let harness = Harness::new(transport);

    let (result, _) = harness.run(&request(Mode::Install, &scene));

    match failed_stage {
        None => {
            result.expect("install succeeds");
        }
        Some(stage) => assert_eq!(result.expect_err("run fails").stage(), stage),
    }
    assert_eq!(harness.transport.downloads().len(), 1);
    assert_eq!(harness.leftover_scratch(), Vec::<String>::new());
}

#[rstest]
fn install_uses_requested_file_name(scene: Scene) {
    let harness = Harness::new(serving_transport());
    let request = RunRequest {
        file_name: Some("cfai-stable".to_owned()),
        ..request(Mode::Install, &scene)
    };

    let outcome = harness.run(&request).0.expect("install succeeds");

    let installed = scene.bin.join("cfai-stable");
    assert!(matches!(outcome, RunOutcome::Installed { ref path, .. } if *path == installed));
    assert!(!scene.bin.join("cfai").exists());
}
