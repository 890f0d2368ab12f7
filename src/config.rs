//! User settings, stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};
use crate::matcher::MatchRule;
use crate::schedule::ScheduleSpec;
use crate::utils;

const APP_DIR: &str = "screensweep";
const SETTINGS_FILE: &str = "settings.toml";

/// Where cleaned files should go, as the user configured it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DestinationSetting {
    #[default]
    Trash,
    Folder {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether the daily cleanup is scheduled at all.
    pub enabled: bool,
    pub cleanup_time: ScheduleSpec,
    pub prefix: String,
    pub case_sensitive: bool,
    /// Directory to sweep. Defaults to the Desktop.
    pub watch_dir: Option<PathBuf>,
    pub destination: DestinationSetting,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_time: ScheduleSpec::default(),
            prefix: "Screenshot".to_string(),
            case_sensitive: true,
            watch_dir: None,
            destination: DestinationSetting::Trash,
        }
    }
}

impl Settings {
    /// `<config dir>/screensweep/settings.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Read settings from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> SweepResult<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SweepError::Config {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        toml::from_str(&raw).map_err(|e| SweepError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> SweepResult<()> {
        let config_err = |message: String| SweepError::Config {
            path: path.to_path_buf(),
            message,
        };
        let raw = toml::to_string_pretty(self).map_err(|e| config_err(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| config_err(e.to_string()))?;
        }
        fs::write(path, raw).map_err(|e| config_err(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    pub fn match_rule(&self) -> MatchRule {
        MatchRule::new(self.prefix.clone(), self.case_sensitive)
    }

    /// The configured directory, or the Desktop.
    pub fn resolved_watch_dir(&self) -> Option<PathBuf> {
        self.watch_dir.clone().or_else(utils::desktop_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert_eq!(settings.cleanup_time.to_string(), "23:59");
        assert_eq!(settings.prefix, "Screenshot");
        assert!(settings.case_sensitive);
        assert_eq!(settings.destination, DestinationSetting::Trash);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = Settings {
            enabled: false,
            cleanup_time: "07:30".parse().unwrap(),
            prefix: "Capture".into(),
            case_sensitive: false,
            watch_dir: Some(PathBuf::from("/tmp/shots")),
            destination: DestinationSetting::Folder {
                path: PathBuf::from("/tmp/archive"),
            },
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "cleanup_time = \"08:15\"\n\n[destination]\nmode = \"folder\"\npath = \"/srv/shots\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.cleanup_time.to_string(), "08:15");
        assert_eq!(settings.prefix, "Screenshot");
        assert_eq!(
            settings.destination,
            DestinationSetting::Folder {
                path: PathBuf::from("/srv/shots")
            }
        );
    }

    #[test]
    fn test_bad_time_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "cleanup_time = \"25:00\"\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, SweepError::Config { .. }));
    }

    #[test]
    fn test_match_rule_from_settings() {
        let settings = Settings {
            prefix: "Shot".into(),
            case_sensitive: false,
            ..Default::default()
        };
        let rule = settings.match_rule();
        assert_eq!(rule.prefix, "Shot");
        assert!(!rule.case_sensitive);
        assert!(rule.allows_extension("HEIC"));
    }
}
