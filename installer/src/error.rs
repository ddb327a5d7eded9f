//! Error types for the cfai installer.
//!
//! Each fatal variant names the pipeline stage that failed so the CLI can
//! print a diagnostic the user can act on. The only non-fatal member is
//! [`InstallerError::VerificationInconclusive`], which the pipeline reports
//! as a warning after a successful copy.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while installing or updating the binary.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The host operating system or architecture is not recognized.
    #[error("unsupported platform: {reason}")]
    UnsupportedPlatform {
        /// Description of the unrecognized value.
        reason: String,
    },

    /// The release registry could not be queried or returned garbage.
    #[error("release lookup for {repo} failed: {reason}")]
    RegistryUnavailable {
        /// The `owner/name` repository identifier.
        repo: String,
        /// Description of the failure.
        reason: String,
    },

    /// No asset in the release is compatible with this platform.
    #[error("no compatible asset for {product} ({platform}) in release {tag}")]
    AssetNotFound {
        /// Product identifier used for matching.
        product: String,
        /// Human-readable platform tag.
        platform: String,
        /// Release tag that was searched.
        tag: String,
    },

    /// Every download attempt failed.
    #[error("download of {asset} failed (tried {}): {reason}", .attempted.join(", "))]
    DownloadFailed {
        /// Asset file name.
        asset: String,
        /// URLs attempted, in order.
        attempted: Vec<String>,
        /// Failure reason of the last attempt.
        reason: String,
    },

    /// The archive could not be read or unpacked.
    #[error("extraction of {archive} failed: {reason}")]
    ExtractionFailed {
        /// The archive file name.
        archive: String,
        /// Description of the failure.
        reason: String,
    },

    /// The archive unpacked cleanly but holds no executable for the product.
    #[error("no {product} executable found inside {archive}")]
    PayloadNotFound {
        /// The archive file name.
        archive: String,
        /// Product binary name searched for.
        product: String,
    },

    /// `install` found an existing binary and `--force` was not given.
    #[error("{path} already exists; rerun with --force to overwrite or use `update`")]
    TargetExists {
        /// The existing binary.
        path: Utf8PathBuf,
    },

    /// The binary could not be written into the install directory.
    #[error("could not install to {path}: {reason}")]
    InstallWriteFailed {
        /// Destination directory or file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The installed binary did not answer its version query.
    #[error("installed {path}, but its version could not be confirmed: {reason}")]
    VerificationInconclusive {
        /// The installed binary.
        path: Utf8PathBuf,
        /// Description of what went wrong.
        reason: String,
    },

    /// The run was interrupted by a signal before the final copy.
    #[error("interrupted; no changes were made to the install location")]
    Interrupted,

    /// An I/O operation failed outside a more specific stage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl InstallerError {
    /// Return the pipeline stage this error belongs to.
    ///
    /// # Examples
    ///
    /// ```
    /// use cfai_installer::error::InstallerError;
    ///
    /// let err = InstallerError::Interrupted;
    /// assert_eq!(err.stage(), "interrupt");
    /// ```
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedPlatform { .. } => "platform detection",
            Self::RegistryUnavailable { .. } => "release lookup",
            Self::AssetNotFound { .. } => "asset resolution",
            Self::DownloadFailed { .. } => "download",
            Self::ExtractionFailed { .. } => "extraction",
            Self::PayloadNotFound { .. } => "payload search",
            Self::TargetExists { .. } | Self::InstallWriteFailed { .. } => "installation",
            Self::VerificationInconclusive { .. } => "verification",
            Self::Interrupted => "interrupt",
            Self::Io(_) => "filesystem",
            #[cfg(any(test, feature = "test-support"))]
            Self::StubMismatch { .. } => "test stub",
        }
    }

    /// Whether this error must abort the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::VerificationInconclusive { .. })
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn download_failed_lists_every_attempt() {
        let err = InstallerError::DownloadFailed {
            asset: "cfai-linux-x86_64.tar.gz".to_owned(),
            attempted: vec![
                "https://mirror.test/https://github.com/a".to_owned(),
                "https://github.com/a".to_owned(),
            ],
            reason: "connection refused".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mirror.test"));
        assert!(msg.contains(", https://github.com/a"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn target_exists_suggests_force() {
        let err = InstallerError::TargetExists {
            path: Utf8PathBuf::from("/usr/local/bin/cfai"),
        };
        assert!(err.to_string().contains("--force"));
    }

    #[rstest]
    #[case::asset(
        InstallerError::AssetNotFound {
            product: "cfai".to_owned(),
            platform: "linux-x86_64".to_owned(),
            tag: "v1.0.0".to_owned(),
        },
        "asset resolution"
    )]
    #[case::payload(
        InstallerError::PayloadNotFound {
            archive: "cfai.zip".to_owned(),
            product: "cfai".to_owned(),
        },
        "payload search"
    )]
    #[case::extraction(
        InstallerError::ExtractionFailed {
            archive: "cfai.zip".to_owned(),
            reason: "bad header".to_owned(),
        },
        "extraction"
    )]
    fn stage_names_the_failed_step(#[case] err: InstallerError, #[case] stage: &str) {
        assert_eq!(err.stage(), stage);
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn inconclusive_verification_is_not_fatal() {
        let err = InstallerError::VerificationInconclusive {
            path: Utf8PathBuf::from("/tmp/cfai"),
            reason: "empty output".to_owned(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn interrupt_uses_sigint_exit_code() {
        assert_eq!(InstallerError::Interrupted.exit_code(), 130);
    }
}
