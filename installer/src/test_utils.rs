//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behaviour suites under `tests/`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::time::Duration;

use crate::command::CommandExecutor;
use crate::error::{InstallerError, Result};
use crate::release::{ReleaseAsset, ReleaseInfo, ReleaseRegistry};
use crate::transport::{DownloadError, Transport};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn success_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "sudo").
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expect `cmd args...` and answer with `result`.
    #[must_use]
    pub fn new(cmd: impl Into<String>, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd: cmd.into(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let received = format!("{cmd} {}", args.join(" "));
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(InstallerError::StubMismatch {
                message: format!("unexpected command invocation: {received}"),
            });
        };
        if call.cmd != cmd || call.args != args {
            return Err(InstallerError::StubMismatch {
                message: format!(
                    "expected {} {}, received {received}",
                    call.cmd,
                    call.args.join(" ")
                ),
            });
        }
        call.result
    }
}

/// Executor that treats files as fake binaries.
///
/// `<file> --version` answers with the file's contents on stdout, so a
/// "binary" containing `cfai 1.2.3` reports version 1.2.3. `sudo install -m
/// <mode> <src> <dest>` and `sudo mkdir -p <dir>` are carried out as plain
/// file operations. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct FileEchoExecutor {
    calls: RefCell<Vec<Vec<String>>>,
}

impl FileEchoExecutor {
    /// Create an executor with an empty call log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations so far, each as `[cmd, args...]`.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Number of `sudo` invocations so far.
    #[must_use]
    pub fn sudo_calls(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.first().is_some_and(|cmd| cmd == "sudo"))
            .count()
    }
}

impl CommandExecutor for FileEchoExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut call = vec![cmd.to_owned()];
        call.extend(args.iter().map(|arg| (*arg).to_owned()));
        self.calls.borrow_mut().push(call);

        match (cmd, args) {
            (_, ["--version"]) => {
                let contents = std::fs::read_to_string(cmd)?;
                Ok(success_output(&contents))
            }
            ("sudo", ["install", "-m", _, src, dest]) => {
                std::fs::copy(src, dest)?;
                Ok(success_output(""))
            }
            ("sudo", ["mkdir", "-p", dir]) => {
                std::fs::create_dir_all(dir)?;
                Ok(success_output(""))
            }
            _ => Err(InstallerError::StubMismatch {
                message: format!("unsupported command: {cmd} {}", args.join(" ")),
            }),
        }
    }
}

/// In-memory [`Transport`] serving fixed bodies.
///
/// URLs without a body, or listed as failing, answer with an HTTP error.
/// Every download attempt is recorded in order.
#[derive(Debug, Default)]
pub struct FakeTransport {
    bodies: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    probe_latency: Option<Duration>,
    downloads: RefCell<Vec<String>>,
    probes: Cell<usize>,
}

impl FakeTransport {
    /// Transport with no bodies and a failing probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`.
    #[must_use]
    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_owned(), body.into());
        self
    }

    /// Make requests to `url` fail even if a body is registered.
    #[must_use]
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_owned());
        self
    }

    /// Answer probes after `latency`.
    #[must_use]
    pub fn with_probe_latency(mut self, latency: Duration) -> Self {
        self.probe_latency = Some(latency);
        self
    }

    /// URLs passed to `download`, in order.
    #[must_use]
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }

    /// Number of probes made.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes.get()
    }

    fn body(&self, url: &str) -> std::result::Result<&[u8], DownloadError> {
        if self.failing.contains(url) {
            return Err(DownloadError::HttpError {
                url: url.to_owned(),
                reason: "connection reset by peer".to_owned(),
            });
        }
        self.bodies
            .get(url)
            .map(Vec::as_slice)
            .ok_or_else(|| DownloadError::NotFound {
                url: url.to_owned(),
            })
    }
}

impl Transport for FakeTransport {
    fn get_text(&self, url: &str) -> std::result::Result<String, DownloadError> {
        Ok(String::from_utf8_lossy(self.body(url)?).into_owned())
    }

    fn download(&self, url: &str, dest: &Path) -> std::result::Result<u64, DownloadError> {
        self.downloads.borrow_mut().push(url.to_owned());
        let body = self.body(url)?;
        std::fs::write(dest, body)?;
        Ok(body.len() as u64)
    }

    fn probe(&self, url: &str) -> std::result::Result<Duration, DownloadError> {
        self.probes.set(self.probes.get() + 1);
        self.probe_latency.ok_or_else(|| DownloadError::HttpError {
            url: url.to_owned(),
            reason: "probe timed out".to_owned(),
        })
    }
}

/// Registry returning one fixed release and counting queries.
#[derive(Debug)]
pub struct FixedRegistry {
    release: ReleaseInfo,
    queries: Cell<usize>,
}

impl FixedRegistry {
    /// Registry that always answers with `release`.
    #[must_use]
    pub fn new(release: ReleaseInfo) -> Self {
        Self {
            release,
            queries: Cell::new(0),
        }
    }

    /// Number of queries answered.
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries.get()
    }
}

impl ReleaseRegistry for FixedRegistry {
    fn release(&self, tag: Option<&str>) -> Result<ReleaseInfo> {
        self.queries.set(self.queries.get() + 1);
        match tag {
            Some(tag) if tag != self.release.version_tag => {
                Err(InstallerError::RegistryUnavailable {
                    repo: "fixed".to_owned(),
                    reason: format!("no release tagged {tag}"),
                })
            }
            _ => Ok(self.release.clone()),
        }
    }
}

/// Download URL used for synthetic assets.
#[must_use]
pub fn asset_url(tag: &str, name: &str) -> String {
    format!("https://github.com/DoBestone/cfai/releases/download/{tag}/{name}")
}

/// Build a synthetic release from `(name, size)` pairs.
#[must_use]
pub fn synthetic_release(tag: &str, assets: &[(&str, u64)]) -> ReleaseInfo {
    ReleaseInfo {
        version_tag: tag.to_owned(),
        assets: assets
            .iter()
            .map(|(name, size_bytes)| ReleaseAsset {
                name: (*name).to_owned(),
                url: asset_url(tag, name),
                size_bytes: *size_bytes,
            })
            .collect(),
    }
}

/// Render a release as the registry's JSON.
#[must_use]
pub fn release_json(release: &ReleaseInfo) -> String {
    let assets: Vec<serde_json::Value> = release
        .assets
        .iter()
        .map(|asset| {
            serde_json::json!({
                "name": asset.name,
                "size": asset.size_bytes,
                "browser_download_url": asset.url,
            })
        })
        .collect();
    serde_json::json!({ "tag_name": release.version_tag, "assets": assets }).to_string()
}

fn append_entries<W: std::io::Write>(builder: &mut tar::Builder<W>, entries: &[(&str, &[u8])]) {
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *body)
            .expect("append tar entry");
    }
}

/// Write a `.tar.gz` archive containing `entries` to `path`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn tar_gz_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create archive");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    append_entries(&mut builder, entries);
    let encoder = builder.into_inner().expect("tar finish");
    encoder.finish().expect("gzip finish");
}

/// Write a `.tar.zst` archive containing `entries` to `path`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn tar_zst_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create archive");
    let encoder = zstd::Encoder::new(file, 0).expect("zstd encoder");
    let mut builder = tar::Builder::new(encoder);
    append_entries(&mut builder, entries);
    let encoder = builder.into_inner().expect("tar finish");
    encoder.finish().expect("zstd finish");
}

/// Write a `.zip` archive containing `entries` to `path`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn zip_archive(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;

    let file = std::fs::File::create(path).expect("create archive");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, body) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(body).expect("write zip entry");
    }
    writer.finish().expect("zip finish");
}

/// Bytes of a `.tar.gz` archive containing `entries`.
///
/// # Panics
///
/// Panics if the archive cannot be built.
#[must_use]
pub fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let temp = tempfile::tempdir().expect("temp dir");
    let path = temp.path().join("asset.tar.gz");
    tar_gz_archive(&path, entries);
    std::fs::read(path).expect("read archive")
}
