//! Idempotent version gate for updates.
//!
//! The gate is an equality check only: the installed binary's dotted
//! version is compared with the release tag after stripping a leading `v`.
//! Any difference, including a downgrade or an unreadable version, lets the
//! update proceed.

use std::sync::OnceLock;

use camino::Utf8Path;
use regex::Regex;

use crate::command::CommandExecutor;

/// Outcome of consulting the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Install the release.
    Proceed {
        /// Version reported by the existing binary, if one answered.
        installed: Option<String>,
    },
    /// The installed binary already matches the release.
    UpToDate {
        /// The matching version.
        version: String,
    },
}

fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d+(?:\.\d+)+").ok())
        .as_ref()
}

/// Strip one leading `v` or `V` from a release tag.
///
/// ```
/// use cfai_installer::version_gate::normalize_tag;
///
/// assert_eq!(normalize_tag("v1.2.3"), "1.2.3");
/// assert_eq!(normalize_tag("1.2.3"), "1.2.3");
/// ```
#[must_use]
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Extract the dotted-numeric version from the first non-empty line of a
/// version query's output.
///
/// ```
/// use cfai_installer::version_gate::extract_version;
///
/// assert_eq!(extract_version("\ncfai 1.2.3 (abc123)\n").as_deref(), Some("1.2.3"));
/// assert_eq!(extract_version("cfai dev build"), None);
/// ```
#[must_use]
pub fn extract_version(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    version_pattern()?
        .find(line)
        .map(|found| found.as_str().to_owned())
}

/// Ask the binary at `path` for its version.
///
/// Returns `None` when the query cannot run, exits unsuccessfully, or
/// prints nothing parseable.
#[must_use]
pub fn query_version(executor: &dyn CommandExecutor, path: &Utf8Path) -> Option<String> {
    let output = match executor.run(path.as_str(), &["--version"]) {
        Ok(output) => output,
        Err(e) => {
            log::debug!(target: "version_gate", "{path} --version failed: {e}");
            return None;
        }
    };
    if !output.status.success() {
        log::debug!(
            target: "version_gate",
            "{path} --version exited with {}",
            output.status
        );
        return None;
    }
    extract_version(&String::from_utf8_lossy(&output.stdout))
}

/// Decide whether the release tagged `latest_tag` needs installing over
/// whatever is at `path`.
#[must_use]
pub fn evaluate(executor: &dyn CommandExecutor, path: &Utf8Path, latest_tag: &str) -> GateDecision {
    if !path.is_file() {
        log::debug!(target: "version_gate", "nothing installed at {path}");
        return GateDecision::Proceed { installed: None };
    }
    decide(query_version(executor, path), latest_tag)
}

/// Compare an installed version with the latest tag.
///
/// ```
/// use cfai_installer::version_gate::{GateDecision, decide};
///
/// assert!(matches!(decide(Some("1.2.3".to_owned()), "v1.2.3"), GateDecision::UpToDate { .. }));
/// assert!(matches!(decide(Some("1.2.4".to_owned()), "v1.2.3"), GateDecision::Proceed { .. }));
/// assert!(matches!(decide(None, "v1.2.3"), GateDecision::Proceed { .. }));
/// ```
#[must_use]
pub fn decide(installed: Option<String>, latest_tag: &str) -> GateDecision {
    match installed {
        Some(version) if version == normalize_tag(latest_tag) => GateDecision::UpToDate { version },
        installed => GateDecision::Proceed { installed },
    }
}
