//! Collision-free destination names.

use std::fs;
use std::path::{Path, PathBuf};

use crate::matcher::CandidateFile;

/// Anything at all at `path` counts as taken, dangling symlinks included.
fn is_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// First free path for `candidate` inside `folder`.
///
/// Tries the original name, then `stem-1.ext`, `stem-2.ext`, ... Must be
/// called right before each move, since earlier moves fill slots.
pub fn safe_destination(candidate: &CandidateFile, folder: &Path) -> PathBuf {
    let first = folder.join(&candidate.base_name);
    if !is_taken(&first) {
        return first;
    }

    let stem = candidate.stem();
    let mut counter: u64 = 1;
    loop {
        let name = if candidate.extension.is_empty() {
            format!("{stem}-{counter}")
        } else {
            format!("{stem}-{counter}.{}", candidate.extension)
        };
        let dest = folder.join(name);
        if !is_taken(&dest) {
            tracing::debug!(
                original = candidate.base_name.as_str(),
                renamed = %dest.display(),
                "Destination taken, using numbered name"
            );
            return dest;
        }
        counter += 1;
    }
}
