//! Running totals kept between launches.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cleaner::CleanupResult;
use crate::error::{SweepError, SweepResult};

const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub total_cleaned: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// [`RunState`] plus where it lives on disk. Without a path it stays in memory.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: RunState,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `state.json` next to the settings file.
    pub fn path_beside(settings_path: &Path) -> PathBuf {
        settings_path
            .parent()
            .map(|p| p.join(STATE_FILE))
            .unwrap_or_else(|| PathBuf::from(STATE_FILE))
    }

    pub fn load(path: &Path) -> SweepResult<Self> {
        let state = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| SweepError::State {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RunState::default(),
            Err(e) => {
                return Err(SweepError::State {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            state,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Add a run to the totals and persist.
    pub fn record(&mut self, result: CleanupResult, at: DateTime<Utc>) -> SweepResult<()> {
        self.state.total_cleaned += result.cleaned as u64;
        self.state.last_run = Some(at);
        self.save()
    }

    fn save(&self) -> SweepResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let state_err = |message: String| SweepError::State {
            path: path.clone(),
            message,
        };
        let raw = serde_json::to_string_pretty(&self.state).map_err(|e| state_err(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| state_err(e.to_string()))?;
        }
        fs::write(path, raw).map_err(|e| state_err(e.to_string()))
    }
}
