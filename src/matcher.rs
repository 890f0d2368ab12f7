//! Picks cleanup candidates out of a single directory listing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::SweepError;

/// Extensions screenshots are saved with.
pub const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "heic", "tiff"];

/// Which file names count as screenshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub prefix: String,
    pub case_sensitive: bool,
    /// Lower-case, without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl MatchRule {
    pub fn new(prefix: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            prefix: prefix.into(),
            case_sensitive,
            allowed_extensions: SCREENSHOT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Extension comparison ignores case no matter what `case_sensitive` says.
    pub fn allows_extension(&self, ext: &str) -> bool {
        let lower = ext.to_lowercase();
        self.allowed_extensions.iter().any(|e| *e == lower)
    }

    /// Anchored prefix test on the whole file name.
    pub fn matches_prefix(&self, name: &str) -> bool {
        if self.case_sensitive {
            name.starts_with(&self.prefix)
        } else {
            name.to_lowercase().starts_with(&self.prefix.to_lowercase())
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return false;
        }
        let ext = match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) => ext,
            None => return false,
        };
        self.allows_extension(ext) && self.matches_prefix(name)
    }
}

impl Default for MatchRule {
    fn default() -> Self {
        Self::new("Screenshot", true)
    }
}

/// A file that qualifies for cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Full file name, extension included.
    pub base_name: String,
    pub extension: String,
}

impl CandidateFile {
    pub fn stem(&self) -> &str {
        self.base_name
            .strip_suffix(&self.extension)
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(&self.base_name)
    }
}

/// Result of matching one directory.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub entries: Vec<CandidateFile>,
    /// Set when the directory itself could not be listed.
    pub unreadable: Option<SweepError>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// List the direct children of `directory` that `rule` accepts, sorted by name.
///
/// Never modifies the directory. An unreadable directory yields no entries and
/// sets `unreadable`.
pub fn find_matches(directory: &Path, rule: &MatchRule) -> ScanResult {
    let mut entries = Vec::new();

    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.path() == Some(directory) || e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                tracing::warn!(
                    path = %directory.display(),
                    error = %source,
                    "Cannot read directory; check folder permissions"
                );
                return ScanResult {
                    entries: Vec::new(),
                    unreadable: Some(SweepError::DirectoryUnreadable {
                        path: directory.to_path_buf(),
                        source,
                    }),
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let name = match entry.file_name().to_str() {
            Some(name) => name,
            None => {
                tracing::warn!(
                    path = %entry.path().display(),
                    "Skipping non-UTF8 file name"
                );
                continue;
            }
        };

        if !rule.matches_name(name) {
            continue;
        }

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        entries.push(CandidateFile {
            path: entry.path().to_path_buf(),
            base_name: name.to_string(),
            extension,
        });
    }

    tracing::debug!(
        path = %directory.display(),
        prefix = rule.prefix.as_str(),
        count = entries.len(),
        "Matched candidates"
    );

    ScanResult {
        entries,
        unreadable: None,
    }
}
