//! User-facing progress and result lines.
//!
//! All lines go to stderr; stdout stays free for the installed binary's own
//! output when the installer is piped.

use std::io::Write;

use camino::Utf8Path;

use crate::error::InstallerError;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Write a progress line unless `quiet` is set.
pub fn progress(stderr: &mut dyn Write, quiet: bool, message: impl std::fmt::Display) {
    if !quiet {
        write_stderr_line(stderr, message);
    }
}

/// Format the success line after installation.
///
/// ```
/// use camino::Utf8Path;
/// use cfai_installer::output::installed_message;
///
/// let msg = installed_message("cfai", "v1.2.3", Utf8Path::new("/usr/local/bin/cfai"));
/// assert_eq!(msg, "Installed cfai v1.2.3 to /usr/local/bin/cfai");
/// ```
#[must_use]
pub fn installed_message(product: &str, tag: &str, path: &Utf8Path) -> String {
    format!("Installed {product} {tag} to {path}")
}

/// Format the no-op line when the gate finds the binary current.
#[must_use]
pub fn up_to_date_message(product: &str, version: &str, path: &Utf8Path) -> String {
    format!("{product} {version} at {path} is already up to date")
}

/// Format a fatal error with the stage that produced it.
///
/// ```
/// use cfai_installer::error::InstallerError;
/// use cfai_installer::output::failure_message;
///
/// let msg = failure_message(&InstallerError::Interrupted);
/// assert!(msg.starts_with("error during interrupt:"));
/// ```
#[must_use]
pub fn failure_message(err: &InstallerError) -> String {
    format!("error during {}: {err}", err.stage())
}

/// Format a non-fatal warning.
#[must_use]
pub fn warning_message(err: &InstallerError) -> String {
    format!("warning: {err}")
}

/// Hint printed when the install directory is not on `PATH`.
#[must_use]
pub fn path_hint(dir: &Utf8Path) -> String {
    format!("note: {dir} is not on PATH; add it to your shell profile to run the binary by name")
}
