//! Error types shared across the sweeper.

use std::io;
use std::path::PathBuf;

/// Errors surfaced to callers of the sweeper.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// The watched directory could not be listed. Never fatal: matching
    /// reports it alongside an empty candidate list.
    #[error("cannot read directory {}: {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A move or trash was refused. The run stops at the offending file;
    /// `cleaned` and `skipped` count what happened before it.
    #[error(
        "permission denied moving {} after {cleaned} cleaned, {skipped} skipped: {source}",
        path.display()
    )]
    PermissionDenied {
        path: PathBuf,
        cleaned: usize,
        skipped: usize,
        #[source]
        source: io::Error,
    },

    /// Another cleanup run is still in flight.
    #[error("a cleanup run is already in progress")]
    RunInProgress,

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("config error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("state error in {}: {message}", path.display())]
    State { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SweepResult<T> = std::result::Result<T, SweepError>;

/// Why a single file could not be relocated.
#[derive(Debug, thiserror::Error)]
pub enum FileFault {
    /// Locked or in use by another process.
    #[error("file busy: {0}")]
    Busy(#[source] io::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),

    #[error(transparent)]
    Other(io::Error),
}

impl FileFault {
    /// Classify an I/O error by kind and, on unix, by raw errno.
    pub fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            return FileFault::PermissionDenied(err);
        }
        #[cfg(unix)]
        if let Some(code) = err.raw_os_error() {
            if code == libc::EBUSY || code == libc::ETXTBSY {
                return FileFault::Busy(err);
            }
        }
        FileFault::Other(err)
    }

    /// Map an error from the `trash` crate onto the same classes.
    ///
    /// Only `FileSystem` carries a real I/O error. The `code` in `Os` is a
    /// helper process exit status on macOS and an HRESULT on Windows, so those
    /// are classified by their description instead.
    pub fn from_trash(err: trash::Error) -> Self {
        match err {
            #[cfg(all(
                unix,
                not(target_os = "macos"),
                not(target_os = "ios"),
                not(target_os = "android")
            ))]
            trash::Error::FileSystem { source, .. } => FileFault::from_io(source),
            trash::Error::Os { description, .. } | trash::Error::Unknown { description } => {
                FileFault::from_description(description)
            }
            other => FileFault::Other(io::Error::other(other.to_string())),
        }
    }

    fn from_description(description: String) -> Self {
        let lower = description.to_lowercase();
        if PERMISSION_WORDING.iter().any(|w| lower.contains(w)) {
            FileFault::PermissionDenied(io::Error::new(
                io::ErrorKind::PermissionDenied,
                description,
            ))
        } else if BUSY_WORDING.iter().any(|w| lower.contains(w)) {
            FileFault::Busy(io::Error::other(description))
        } else {
            FileFault::Other(io::Error::other(description))
        }
    }
}

const PERMISSION_WORDING: &[&str] = &[
    "not permitted",
    "permission denied",
    "not authorized",
    "access is denied",
];

const BUSY_WORDING: &[&str] = &["in use", "busy", "locked"];
