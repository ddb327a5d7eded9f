//! Platform identification for release asset matching.
//!
//! Raw operating-system and machine strings (as reported by `uname` or by
//! the compile-time target) are normalized into a [`PlatformTag`]. Asset
//! names in the wild use several spellings for the same platform, so each
//! canonical value also exposes the token vocabulary used when matching.

use std::fmt;

use crate::error::InstallerError;

/// Canonical operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux, any libc.
    Linux,
    /// macOS (Darwin).
    Macos,
    /// Windows, including MSYS, MinGW and Cygwin shells.
    Windows,
}

/// Canonical CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM.
    Arm64,
}

/// Errors arising from platform normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The operating-system string is not recognized.
    #[error("unrecognized operating system \"{0}\"")]
    UnknownOs(String),
    /// The architecture string is not recognized.
    #[error("unrecognized architecture \"{0}\"")]
    UnknownArch(String),
}

impl From<PlatformError> for InstallerError {
    fn from(err: PlatformError) -> Self {
        Self::UnsupportedPlatform {
            reason: err.to_string(),
        }
    }
}

impl Os {
    /// Normalize a raw operating-system string.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::UnknownOs`] for unrecognized values.
    pub fn from_raw(raw: &str) -> Result<Self, PlatformError> {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "linux" => Ok(Self::Linux),
            "darwin" | "macos" => Ok(Self::Macos),
            other
                if ["msys", "mingw", "cygwin", "windows"]
                    .iter()
                    .any(|prefix| other.starts_with(prefix)) =>
            {
                Ok(Self::Windows)
            }
            _ => Err(PlatformError::UnknownOs(raw.to_owned())),
        }
    }

    /// Substrings that identify this OS in asset names.
    #[must_use]
    pub fn asset_tokens(self) -> &'static [&'static str] {
        match self {
            Self::Linux => &["linux"],
            Self::Macos => &["darwin", "macos", "apple", "osx"],
            // Plain "win" would also match "darwin".
            Self::Windows => &["windows", "win64", "msvc"],
        }
    }

    /// Canonical lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }
}

impl Arch {
    /// Normalize a raw machine architecture string.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::UnknownArch`] for unrecognized values.
    pub fn from_raw(raw: &str) -> Result<Self, PlatformError> {
        match raw.trim().to_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(PlatformError::UnknownArch(raw.to_owned())),
        }
    }

    /// Substrings that identify this architecture in asset names.
    #[must_use]
    pub fn asset_tokens(self) -> &'static [&'static str] {
        match self {
            Self::X86_64 => &["x86_64", "amd64", "x64"],
            Self::Arm64 => &["aarch64", "arm64"],
        }
    }

    /// Canonical lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }
}

/// A normalized operating system and architecture pair.
///
/// # Examples
///
/// ```
/// use cfai_installer::platform::{Arch, Os, PlatformTag};
///
/// let tag = PlatformTag::from_raw("Darwin", "aarch64").expect("known platform");
/// assert_eq!(tag.os, Os::Macos);
/// assert_eq!(tag.arch, Arch::Arm64);
/// assert_eq!(tag.to_string(), "macos-arm64");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTag {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl PlatformTag {
    /// Normalize raw OS and architecture strings.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when either value is unrecognized; no
    /// default is substituted.
    pub fn from_raw(os: &str, arch: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            os: Os::from_raw(os)?,
            arch: Arch::from_raw(arch)?,
        })
    }

    /// Detect the platform this binary was built for.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] on targets outside the supported matrix.
    pub fn detect() -> Result<Self, PlatformError> {
        Self::from_raw(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Suffix carried by executables on this platform.
    #[must_use]
    pub fn exe_suffix(self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::Macos => "",
        }
    }

    /// File name of the product binary on this platform.
    ///
    /// ```
    /// use cfai_installer::platform::PlatformTag;
    ///
    /// let windows = PlatformTag::from_raw("MINGW64_NT-10.0", "x86_64").expect("known");
    /// assert_eq!(windows.binary_file_name("cfai"), "cfai.exe");
    /// ```
    #[must_use]
    pub fn binary_file_name(self, product: &str) -> String {
        format!("{product}{}", self.exe_suffix())
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}
