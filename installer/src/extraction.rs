//! Archive extraction for downloaded release assets.
//!
//! Unpacks `.tar.gz`, `.tar.zst` and `.zip` archives into a scratch
//! directory with path traversal protection against zip-slip. Only regular
//! files and directories are materialized; links are skipped.

use std::fs::File;
use std::path::{Component, Path};

use crate::interrupt::{CancelToken, CopyError, copy_interruptible};

/// Archive format inferred from an asset name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Gzip-compressed tarball (`.tar.gz`, `.tgz`).
    TarGz,
    /// Zstandard-compressed tarball (`.tar.zst`, `.tzst`).
    TarZst,
    /// Zip archive.
    Zip,
    /// Not an archive; the file is the payload.
    Raw,
}

impl ArchiveKind {
    /// Classify an asset by its (case-insensitive) file name suffix.
    ///
    /// ```
    /// use cfai_installer::extraction::ArchiveKind;
    ///
    /// assert_eq!(ArchiveKind::from_name("cfai-linux-x86_64.TGZ"), ArchiveKind::TarGz);
    /// assert_eq!(ArchiveKind::from_name("cfai-linux-x86_64"), ArchiveKind::Raw);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
            Self::TarZst
        } else if lower.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Raw
        }
    }

    /// Whether the kind needs unpacking.
    #[must_use]
    pub fn is_archive(self) -> bool {
        !matches!(self, Self::Raw)
    }
}

/// Trait for unpacking archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the `kind` archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the number of regular files written.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if any entry attempts to
    /// escape the destination, [`ExtractionError::Corrupt`] or
    /// [`ExtractionError::Io`] when the archive cannot be read, and
    /// [`ExtractionError::Interrupted`] on cancellation.
    fn extract(
        &self,
        kind: ArchiveKind,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<usize, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive structure could not be decoded.
    #[error("corrupt archive: {reason}")]
    Corrupt {
        /// Decoder diagnostic.
        reason: String,
    },

    /// Extraction stopped because of a signal.
    #[error("extraction interrupted")]
    Interrupted,

    /// The file is not an archive.
    #[error("not an archive")]
    NotAnArchive,
}

impl From<CopyError> for ExtractionError {
    fn from(err: CopyError) -> Self {
        match err {
            CopyError::Io(e) => Self::Io(e),
            CopyError::Interrupted => Self::Interrupted,
        }
    }
}

impl From<zip::result::ZipError> for ExtractionError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Corrupt {
                reason: other.to_string(),
            },
        }
    }
}

/// Default extractor using the `tar`, `flate2`, `zstd` and `zip` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageExtractor {
    cancel: CancelToken,
}

impl PackageExtractor {
    /// Create an extractor that polls `cancel` between entries.
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn check_cancel(&self) -> Result<(), ExtractionError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractionError::Interrupted);
        }
        Ok(())
    }

    fn extract_tar(
        &self,
        reader: &mut dyn std::io::Read,
        dest_dir: &Path,
    ) -> Result<usize, ExtractionError> {
        let mut archive = tar::Archive::new(reader);
        let mut written = 0;

        for entry_result in archive.entries()? {
            self.check_cancel()?;
            let mut entry = entry_result?;
            let entry_path = entry.path()?.into_owned();
            validate_entry_path(&entry_path)?;

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                std::fs::create_dir_all(dest_dir.join(&entry_path))?;
                continue;
            }
            if !entry_type.is_file() {
                log::debug!(
                    target: "extraction",
                    "skipping non-regular entry {}",
                    entry_path.display()
                );
                continue;
            }

            if entry.unpack_in(dest_dir)? {
                written += 1;
            }
        }

        Ok(written)
    }

    fn extract_zip(&self, archive_path: &Path, dest_dir: &Path) -> Result<usize, ExtractionError> {
        let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
        let mut written = 0;

        for index in 0..archive.len() {
            self.check_cancel()?;
            let mut file = archive.by_index(index)?;
            let Some(relative) = file.enclosed_name() else {
                return Err(ExtractionError::PathTraversal {
                    path: file.name().to_owned(),
                });
            };
            validate_entry_path(&relative)?;
            let dest_path = dest_dir.join(&relative);

            if file.is_dir() {
                std::fs::create_dir_all(&dest_path)?;
                continue;
            }
            if file.is_symlink() {
                log::debug!(target: "extraction", "skipping symlink {}", relative.display());
                continue;
            }

            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest_path)?;
            copy_interruptible(&mut file, &mut out, self.cancel)?;
            #[cfg(unix)]
            if let Some(mode) = file.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(
                    &dest_path,
                    std::fs::Permissions::from_mode(mode & 0o777),
                )?;
            }
            written += 1;
        }

        Ok(written)
    }
}

impl ArchiveExtractor for PackageExtractor {
    fn extract(
        &self,
        kind: ArchiveKind,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<usize, ExtractionError> {
        std::fs::create_dir_all(dest_dir)?;
        match kind {
            ArchiveKind::TarGz => {
                let mut decoder = flate2::read::GzDecoder::new(File::open(archive_path)?);
                self.extract_tar(&mut decoder, dest_dir)
            }
            ArchiveKind::TarZst => {
                let mut decoder = zstd::Decoder::new(File::open(archive_path)?)?;
                self.extract_tar(&mut decoder, dest_dir)
            }
            ArchiveKind::Zip => self.extract_zip(archive_path, dest_dir),
            ArchiveKind::Raw => Err(ExtractionError::NotAnArchive),
        }
    }
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
