//! Resolving a saved destination folder into a usable path.

use std::path::PathBuf;

/// Something that can hand back a destination folder, or nothing if the
/// grant is stale.
pub trait FolderAccess {
    fn resolve(&self) -> Option<PathBuf>;
}

/// A plain configured path. Resolves only while it is an existing directory.
#[derive(Debug, Clone)]
pub struct ConfiguredFolder {
    path: PathBuf,
}

impl ConfiguredFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FolderAccess for ConfiguredFolder {
    fn resolve(&self) -> Option<PathBuf> {
        if self.path.is_dir() {
            Some(self.path.clone())
        } else {
            tracing::debug!(path = %self.path.display(), "Destination folder not available");
            None
        }
    }
}

impl<F> FolderAccess for F
where
    F: Fn() -> Option<PathBuf>,
{
    fn resolve(&self) -> Option<PathBuf> {
        self()
    }
}
