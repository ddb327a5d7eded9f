//! Cooperative interruption.
//!
//! SIGINT and SIGTERM only raise a flag; long-running loops poll it through
//! a [`CancelToken`] and unwind with an `Interrupted` error so that scratch
//! directories are dropped and the install location is left untouched. The
//! handler resets to the default disposition after the first signal, so a
//! second Ctrl-C terminates immediately.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const COPY_CHUNK: usize = 64 * 1024;

/// A handle onto an interruption flag.
#[derive(Debug, Clone, Copy)]
pub struct CancelToken {
    flag: &'static AtomicBool,
}

impl CancelToken {
    /// Token observing the process-wide signal flag.
    #[must_use]
    pub fn global() -> Self {
        Self {
            flag: &INTERRUPTED,
        }
    }

    /// Token observing a caller-owned flag.
    #[must_use]
    pub fn from_flag(flag: &'static AtomicBool) -> Self {
        Self { flag }
    }

    /// Whether an interruption has been requested.
    #[must_use]
    pub fn is_cancelled(self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request interruption.
    pub fn cancel(self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::global()
    }
}

/// Failure of an interruptible copy.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Reading or writing failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Cancellation was observed between chunks.
    #[error("copy interrupted")]
    Interrupted,
}

/// Copy `reader` into `writer` in chunks, checking `cancel` between chunks.
///
/// # Errors
///
/// Returns [`CopyError::Interrupted`] once cancellation is observed, or
/// [`CopyError::Io`] on read or write failures.
pub fn copy_interruptible(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    cancel: CancelToken,
) -> Result<u64, CopyError> {
    let mut buf = vec![0_u8; COPY_CHUNK];
    let mut total: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Interrupted);
        }
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Io(e)),
        };
        writer.write_all(buf.get(..read).unwrap_or_default())?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Install the SIGINT and SIGTERM handlers that raise the global flag.
///
/// # Errors
///
/// Returns an I/O error when the handlers cannot be registered.
#[cfg(unix)]
pub fn install_signal_handlers() -> std::io::Result<()> {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn handler(_sig: i32) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe.
        unsafe { signal::sigaction(sig, &action) }.map_err(std::io::Error::from)?;
    }
    Ok(())
}

/// Signal handling is not wired up on this platform; runs can still be
/// killed, and the final rename keeps the install location consistent.
#[cfg(not(unix))]
pub fn install_signal_handlers() -> std::io::Result<()> {
    Ok(())
}
