//! Directory resolution abstraction for platform-specific paths.
//!
//! The install fallback needs a user-scoped binary directory. It sits behind
//! [`BaseDirs`] so tests can point it at a temporary directory.

use std::path::PathBuf;

/// Source of well-known user directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// User-scoped directory for executables, `~/.local/bin` on Unix.
    fn bin_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
///
/// # Examples
///
/// ```
/// use cfai_installer::dirs::{BaseDirs, SystemBaseDirs};
///
/// let dirs = SystemBaseDirs;
/// if let Some(bin) = dirs.bin_dir() {
///     assert!(bin.is_absolute());
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn bin_dir(&self) -> Option<PathBuf> {
        let dirs = directories_next::BaseDirs::new()?;
        // Only Linux reports an executable directory; elsewhere follow the
        // same `~/.local/bin` convention.
        Some(
            dirs.executable_dir()
                .map_or_else(|| dirs.home_dir().join(".local").join("bin"), PathBuf::from),
        )
    }
}
