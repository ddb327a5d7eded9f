//! Payload location inside downloaded assets.
//!
//! Raw assets are their own payload. Archives are extracted into the scratch
//! directory and searched depth-first in file-name order for the product
//! executable.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{InstallerError, Result};
use crate::extraction::{ArchiveExtractor, ArchiveKind, ExtractionError};
use crate::fetch::ResolvedTarget;
use crate::platform::PlatformTag;

/// Extensions that never mark an executable payload.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "md", "txt", "rst", "html", "pdf", "1", "json", "sha256", "sha512", "asc", "sig", "sbom",
    "bash", "zsh", "fish", "ps1",
];

/// The located, ready-to-install binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExecutable {
    /// Path of the payload inside scratch storage.
    pub path: PathBuf,
}

/// Decide whether a file name identifies the product executable.
///
/// ```
/// use cfai_installer::unpack::is_payload_name;
///
/// assert!(is_payload_name("cfai", "cfai", ""));
/// assert!(is_payload_name("cfai-aarch64-apple-darwin", "cfai", ""));
/// assert!(!is_payload_name("cfai.txt", "cfai", ""));
/// assert!(is_payload_name("tool.exe", "cfai", ".exe"));
/// ```
#[must_use]
pub fn is_payload_name(file_name: &str, product: &str, exe_suffix: &str) -> bool {
    let name = file_name.to_lowercase();
    let product = product.to_lowercase();

    let excluded = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXCLUDED_EXTENSIONS.contains(&ext));
    if excluded {
        return false;
    }

    let exact = name == format!("{product}{exe_suffix}") || name == product;
    let prefixed = name.starts_with(&format!("{product}-"));
    let suffixed = !exe_suffix.is_empty() && name.ends_with(exe_suffix);
    exact || prefixed || suffixed
}

/// Locates the payload for one product and platform.
pub struct Unpacker<'e, E: ArchiveExtractor + ?Sized> {
    extractor: &'e E,
    product: String,
    exe_suffix: &'static str,
}

impl<'e, E: ArchiveExtractor + ?Sized> Unpacker<'e, E> {
    /// Create an unpacker for `product` built for `platform`.
    #[must_use]
    pub fn new(extractor: &'e E, product: &str, platform: PlatformTag) -> Self {
        Self {
            extractor,
            product: product.to_owned(),
            exe_suffix: platform.exe_suffix(),
        }
    }

    /// Produce the payload for a downloaded target.
    ///
    /// Archives are unpacked into `scratch/unpacked`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ExtractionFailed`] for unreadable archives,
    /// [`InstallerError::PayloadNotFound`] when extraction succeeds but no
    /// file qualifies, and [`InstallerError::Interrupted`] on cancellation.
    pub fn unpack(&self, target: &ResolvedTarget, scratch: &Path) -> Result<InstalledExecutable> {
        let archive_name = target.asset.name.clone();
        let kind = ArchiveKind::from_name(&archive_name);
        if !kind.is_archive() {
            log::debug!(target: "unpack", "{archive_name} is a raw payload");
            return Ok(InstalledExecutable {
                path: target.local_archive_path.clone(),
            });
        }

        let dest = scratch.join("unpacked");
        let count = self
            .extractor
            .extract(kind, &target.local_archive_path, &dest)
            .map_err(|err| match err {
                ExtractionError::Interrupted => InstallerError::Interrupted,
                other => InstallerError::ExtractionFailed {
                    archive: archive_name.clone(),
                    reason: other.to_string(),
                },
            })?;
        log::debug!(target: "unpack", "extracted {count} files from {archive_name}");

        self.search(&dest)?
            .map(|path| InstalledExecutable { path })
            .ok_or_else(|| InstallerError::PayloadNotFound {
                archive: archive_name,
                product: self.product.clone(),
            })
    }

    fn search(&self, root: &Path) -> Result<Option<PathBuf>> {
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| InstallerError::ExtractionFailed {
                archive: root.display().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if is_payload_name(&name, &self.product, self.exe_suffix) {
                log::debug!(target: "unpack", "payload candidate {}", entry.path().display());
                return Ok(Some(entry.into_path()));
            }
        }
        Ok(None)
    }
}
