use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::conflict;
use crate::error::{FileFault, SweepError, SweepResult};
use crate::matcher::{self, CandidateFile, MatchRule};

/// Where cleaned files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The platform trash, restorable by the user.
    Trash,
    /// An existing, writable directory.
    Folder(PathBuf),
}

impl Destination {
    pub fn label(&self) -> String {
        match self {
            Destination::Trash => "Trash".to_string(),
            Destination::Folder(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

/// Counts for one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupResult {
    pub cleaned: usize,
    pub skipped: usize,
}

/// The filesystem operations a cleanup run needs.
pub trait Relocator {
    /// Send `path` to the recoverable trash.
    fn trash(&self, path: &Path) -> Result<(), FileFault>;

    /// Move `from` to `to`, which was free when probed. Must fail with
    /// `AlreadyExists` rather than replace a file that appeared since.
    fn move_to(&self, from: &Path, to: &Path) -> Result<(), FileFault>;
}

/// Real filesystem: the `trash` crate plus a no-replace move.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRelocator;

impl Relocator for SystemRelocator {
    fn trash(&self, path: &Path) -> Result<(), FileFault> {
        trash::delete(path).map_err(FileFault::from_trash)
    }

    fn move_to(&self, from: &Path, to: &Path) -> Result<(), FileFault> {
        move_file(from, to).map_err(FileFault::from_io)
    }
}

#[cfg(unix)]
fn crosses_devices(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn crosses_devices(_err: &io::Error) -> bool {
    false
}

/// Move `from` to `to` without ever replacing an existing `to`.
///
/// Links the file into place and unlinks the source, so a name taken since
/// it was probed fails with `AlreadyExists`. Falls back to a copy across
/// volumes, and to a checked rename where hard links are unsupported.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) if crosses_devices(&e) => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                "Cross-device move, copying instead"
            );
            copy_then_remove(from, to)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Hard link unavailable, renaming");
            if fs::symlink_metadata(to).is_ok() {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            fs::rename(from, to)
        }
    }
}

/// Copy `from` into a newly created `to`, then remove `from`.
pub fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    copy_then_remove_with(from, to, |src, dst| io::copy(src, dst))
}

/// [`copy_then_remove`] with the byte copy supplied by the caller.
///
/// Whatever fails, at most one of `from` and `to` is left behind, and a
/// partially written `to` is removed.
pub fn copy_then_remove_with<F>(from: &Path, to: &Path, copy: F) -> io::Result<()>
where
    F: FnOnce(&mut fs::File, &mut fs::File) -> io::Result<u64>,
{
    let mut src = fs::File::open(from)?;
    let permissions = src.metadata()?.permissions();
    let mut dst = fs::OpenOptions::new().write(true).create_new(true).open(to)?;

    let copied = copy(&mut src, &mut dst)
        .and_then(|_| dst.sync_all())
        .and_then(|()| fs::set_permissions(to, permissions));
    drop(dst);
    if let Err(e) = copied {
        let _ = fs::remove_file(to);
        return Err(e);
    }

    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

/// How often a move is retried when its destination name is taken under it.
const NAME_RETRIES: usize = 3;

/// Matches files and relocates them, one run at a time.
pub struct CleanupEngine<R: Relocator = SystemRelocator> {
    relocator: R,
}

impl CleanupEngine<SystemRelocator> {
    pub fn new() -> Self {
        Self {
            relocator: SystemRelocator,
        }
    }
}

impl Default for CleanupEngine<SystemRelocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Relocator> CleanupEngine<R> {
    pub fn with_relocator(relocator: R) -> Self {
        Self { relocator }
    }

    pub fn relocator(&self) -> &R {
        &self.relocator
    }

    /// Move `candidate` to a free name in `folder`, probing again if the
    /// name is claimed between the probe and the move.
    fn move_into(&self, candidate: &CandidateFile, folder: &Path) -> Result<(), FileFault> {
        let mut attempt = 0;
        loop {
            let dest = conflict::safe_destination(candidate, folder);
            match self.relocator.move_to(&candidate.path, &dest) {
                Err(FileFault::Other(e))
                    if e.kind() == io::ErrorKind::AlreadyExists && attempt < NAME_RETRIES =>
                {
                    attempt += 1;
                    tracing::debug!(
                        dest = %dest.display(),
                        attempt,
                        "Destination taken, probing again"
                    );
                }
                outcome => return outcome,
            }
        }
    }

    /// Move every file in `directory` that `rule` matches to `destination`.
    ///
    /// Busy files and other per-file failures are skipped. A permission
    /// failure stops the run and is the only error returned. An unreadable
    /// `directory` is an empty run.
    pub fn perform_cleanup(
        &self,
        rule: &MatchRule,
        destination: &Destination,
        directory: &Path,
    ) -> SweepResult<CleanupResult> {
        let scan = matcher::find_matches(directory, rule);
        if scan.unreadable.is_some() {
            return Ok(CleanupResult::default());
        }

        let mut result = CleanupResult::default();

        for candidate in &scan.entries {
            let outcome = match destination {
                Destination::Trash => self.relocator.trash(&candidate.path),
                Destination::Folder(folder) => self.move_into(candidate, folder),
            };

            match outcome {
                Ok(()) => {
                    result.cleaned += 1;
                    tracing::debug!(path = %candidate.path.display(), "Cleaned");
                }
                Err(FileFault::Busy(e)) => {
                    result.skipped += 1;
                    tracing::info!(
                        name = candidate.base_name.as_str(),
                        error = %e,
                        "File busy, skipping"
                    );
                }
                Err(FileFault::PermissionDenied(e)) => {
                    tracing::error!(
                        path = %candidate.path.display(),
                        destination = %destination.label(),
                        error = %e,
                        "Permission denied, aborting cleanup"
                    );
                    return Err(SweepError::PermissionDenied {
                        path: candidate.path.clone(),
                        cleaned: result.cleaned,
                        skipped: result.skipped,
                        source: e,
                    });
                }
                Err(FileFault::Other(e)) => {
                    result.skipped += 1;
                    tracing::error!(
                        path = %candidate.path.display(),
                        error = %e,
                        "Failed to move file"
                    );
                }
            }
        }

        tracing::info!(
            directory = %directory.display(),
            destination = %destination.label(),
            cleaned = result.cleaned,
            skipped = result.skipped,
            "Cleanup finished"
        );
        Ok(result)
    }
}
