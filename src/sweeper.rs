//! Ties settings, the cleanup engine and the scheduler together.
//!
//! Manual and scheduled runs share one busy flag, so at most one cleanup is
//! ever in flight. A run that loses the race is refused, not queued.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Local, TimeZone};

use crate::access::{ConfiguredFolder, FolderAccess};
use crate::cleaner::{CleanupEngine, CleanupResult, Destination, Relocator, SystemRelocator};
use crate::config::{DestinationSetting, Settings};
use crate::error::{SweepError, SweepResult};
use crate::matcher::{self, ScanResult};
use crate::schedule::{self, Clock, SystemClock};
use crate::scheduler::SchedulerHandle;
use crate::state::{RunState, StateStore};

type SharedFolderAccess = Box<dyn FolderAccess + Send + Sync>;

/// Clears the busy flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Sweeper<R: Relocator = SystemRelocator> {
    settings: RwLock<Settings>,
    engine: CleanupEngine<R>,
    store: Mutex<StateStore>,
    clock: Arc<dyn Clock>,
    folder_access: Option<SharedFolderAccess>,
    running: AtomicBool,
}

impl Sweeper<SystemRelocator> {
    pub fn new(settings: Settings, store: StateStore) -> Self {
        Self::with_parts(settings, store, CleanupEngine::new(), Arc::new(SystemClock))
    }
}

impl<R: Relocator> Sweeper<R> {
    pub fn with_parts(
        settings: Settings,
        store: StateStore,
        engine: CleanupEngine<R>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            engine,
            store: Mutex::new(store),
            clock,
            folder_access: None,
            running: AtomicBool::new(false),
        }
    }

    /// Use `access` instead of the configured folder path to find the
    /// destination folder.
    pub fn with_folder_access(mut self, access: impl FolderAccess + Send + Sync + 'static) -> Self {
        self.folder_access = Some(Box::new(access));
        self
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings. Call [`Sweeper::arm`] afterwards to pick up a new
    /// time or enabled flag.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn run_state(&self) -> RunState {
        self.lock_store().state().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn lock_store(&self) -> MutexGuard<'_, StateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch_dir(settings: &Settings) -> Option<PathBuf> {
        let dir = settings.resolved_watch_dir();
        if dir.is_none() {
            tracing::error!("Could not resolve the directory to sweep");
        }
        dir
    }

    /// Resolve the configured destination. A folder that cannot be resolved
    /// falls back to the trash.
    pub fn destination(&self) -> Destination {
        self.destination_for(&self.settings())
    }

    fn destination_for(&self, settings: &Settings) -> Destination {
        let DestinationSetting::Folder { path } = &settings.destination else {
            return Destination::Trash;
        };
        let resolved = match &self.folder_access {
            Some(access) => access.resolve(),
            None => ConfiguredFolder::new(path).resolve(),
        };
        match resolved {
            Some(folder) => Destination::Folder(folder),
            None => {
                tracing::error!(
                    path = %path.display(),
                    "Destination folder unavailable, defaulting to trash"
                );
                Destination::Trash
            }
        }
    }

    /// What a run would pick up right now. Touches nothing.
    pub fn preview(&self) -> ScanResult {
        let settings = self.settings();
        match Self::watch_dir(&settings) {
            Some(dir) => matcher::find_matches(&dir, &settings.match_rule()),
            None => ScanResult::default(),
        }
    }

    /// Run a cleanup now unless one is already in flight.
    ///
    /// Totals are recorded even when the run stops on a permission error,
    /// since the files cleaned before it did move.
    pub fn clean_now(&self) -> SweepResult<CleanupResult> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SweepError::RunInProgress);
        }
        let _guard = RunGuard(&self.running);

        let settings = self.settings();
        let Some(dir) = Self::watch_dir(&settings) else {
            return Ok(CleanupResult::default());
        };
        let destination = self.destination_for(&settings);
        let outcome = self
            .engine
            .perform_cleanup(&settings.match_rule(), &destination, &dir);

        let recorded = match &outcome {
            Ok(result) => Some(*result),
            Err(SweepError::PermissionDenied { cleaned, skipped, .. }) => Some(CleanupResult {
                cleaned: *cleaned,
                skipped: *skipped,
            }),
            Err(_) => None,
        };
        if let Some(recorded) = recorded {
            if let Err(e) = self.lock_store().record(recorded, self.clock.now()) {
                tracing::warn!(error = %e, "Failed to save run state");
            }
        }
        outcome
    }

    /// The next scheduled run in `tz`, or `None` when scheduling is off.
    pub fn next_run_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        let settings = self.settings();
        if !settings.enabled {
            return None;
        }
        let now = self.clock.now().with_timezone(tz);
        Some(schedule::next_run(settings.cleanup_time.into(), &now, tz))
    }

    /// The latest scheduled slot at or before now, in `tz`.
    pub fn previous_run_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        let settings = self.settings();
        let now = self.clock.now().with_timezone(tz);
        schedule::previous_run(settings.cleanup_time, &now, tz)
    }
}

impl<R: Relocator + Send + Sync + 'static> Sweeper<R> {
    /// Arm `scheduler` for the next run in local time.
    pub fn arm(self: &Arc<Self>, scheduler: &SchedulerHandle) -> Option<DateTime<Local>> {
        self.arm_in(scheduler, Local)
    }

    /// Arm `scheduler` for the next run in `tz`. Each fire runs a cleanup and
    /// arms again. Disabled settings leave the scheduler idle.
    pub fn arm_in<Tz>(
        self: &Arc<Self>,
        scheduler: &SchedulerHandle,
        tz: Tz,
    ) -> Option<DateTime<Tz>>
    where
        Tz: TimeZone + Send + 'static,
    {
        let Some(next) = self.next_run_in(&tz) else {
            scheduler.invalidate();
            tracing::info!("Scheduled cleanup disabled");
            return None;
        };

        let sweeper = Arc::downgrade(self);
        let rearm = scheduler.clone();
        scheduler.schedule(next.clone(), move || {
            let Some(sweeper) = sweeper.upgrade() else {
                return;
            };
            sweeper.run_scheduled();
            sweeper.arm_in(&rearm, tz);
        });

        tracing::info!(next_run = %next.with_timezone(&chrono::Utc), "Next cleanup scheduled");
        Some(next)
    }

    fn run_scheduled(&self) {
        match self.clean_now() {
            Ok(result) => tracing::info!(
                cleaned = result.cleaned,
                skipped = result.skipped,
                "Scheduled cleanup complete"
            ),
            Err(SweepError::RunInProgress) => {
                tracing::warn!("Skipping scheduled cleanup, another run is in progress")
            }
            Err(e) => tracing::error!(error = %e, "Scheduled cleanup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::move_file;
    use crate::error::FileFault;
    use crate::schedule::FixedClock;
    use chrono::Utc;
    use std::fs;
    use std::path::Path;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn sweeper_for(watch: &std::path::Path, destination: DestinationSetting) -> Sweeper {
        let settings = Settings {
            watch_dir: Some(watch.to_path_buf()),
            destination,
            ..Default::default()
        };
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        Sweeper::with_parts(
            settings,
            StateStore::in_memory(),
            CleanupEngine::new(),
            Arc::new(clock),
        )
    }

    #[test]
    fn test_clean_now_records_totals() {
        let watch = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(watch.path().join("Screenshot 1.png"), b"").unwrap();
        fs::write(watch.path().join("Screenshot 2.png"), b"").unwrap();

        let sweeper = sweeper_for(
            watch.path(),
            DestinationSetting::Folder {
                path: dest.path().to_path_buf(),
            },
        );
        assert_eq!(sweeper.preview().len(), 2);

        let result = sweeper.clean_now().unwrap();
        assert_eq!(result, CleanupResult { cleaned: 2, skipped: 0 });

        let state = sweeper.run_state();
        assert_eq!(state.total_cleaned, 2);
        assert_eq!(state.last_run, Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        assert!(!sweeper.is_running());
    }

    #[test]
    fn test_missing_folder_falls_back_to_trash() {
        let watch = tempfile::tempdir().unwrap();
        let sweeper = sweeper_for(
            watch.path(),
            DestinationSetting::Folder {
                path: watch.path().join("does-not-exist"),
            },
        );
        assert_eq!(sweeper.destination(), Destination::Trash);
    }

    #[test]
    fn test_folder_access_override() {
        let watch = tempfile::tempdir().unwrap();
        let granted = tempfile::tempdir().unwrap();
        let granted_path = granted.path().to_path_buf();
        let sweeper = sweeper_for(
            watch.path(),
            DestinationSetting::Folder {
                path: PathBuf::from("/bookmarked"),
            },
        )
        .with_folder_access(move || Some(granted_path.clone()));

        assert_eq!(
            sweeper.destination(),
            Destination::Folder(granted.path().to_path_buf())
        );
    }

    /// Holds every move until the test lets it go.
    struct HeldRelocator {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Relocator for HeldRelocator {
        fn trash(&self, path: &Path) -> Result<(), FileFault> {
            fs::remove_file(path).map_err(FileFault::from_io)
        }

        fn move_to(&self, from: &Path, to: &Path) -> Result<(), FileFault> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            move_file(from, to).map_err(FileFault::from_io)
        }
    }

    #[test]
    fn test_second_run_refused_while_first_is_moving() {
        let watch = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(watch.path().join("Screenshot 1.png"), b"").unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let settings = Settings {
            watch_dir: Some(watch.path().to_path_buf()),
            destination: DestinationSetting::Folder {
                path: dest.path().to_path_buf(),
            },
            ..Default::default()
        };
        let engine = CleanupEngine::with_relocator(HeldRelocator {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let sweeper = Arc::new(Sweeper::with_parts(
            settings,
            StateStore::in_memory(),
            engine,
            Arc::new(clock),
        ));

        let first = {
            let sweeper = Arc::clone(&sweeper);
            thread::spawn(move || sweeper.clean_now())
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(sweeper.is_running());
        assert!(matches!(sweeper.clean_now(), Err(SweepError::RunInProgress)));

        release_tx.send(()).unwrap();
        let result = first.join().unwrap().unwrap();
        assert_eq!(result, CleanupResult { cleaned: 1, skipped: 0 });
        assert!(!sweeper.is_running());
        assert_eq!(sweeper.run_state().total_cleaned, 1);

        // Nothing left to move, but the run is accepted again.
        assert_eq!(sweeper.clean_now().unwrap(), CleanupResult::default());
    }

    #[test]
    fn test_next_run_uses_clock_and_settings() {
        let watch = tempfile::tempdir().unwrap();
        let sweeper = sweeper_for(watch.path(), DestinationSetting::Trash);

        assert_eq!(
            sweeper.next_run_in(&Utc),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap())
        );
        assert_eq!(
            sweeper.previous_run_in(&Utc),
            Some(Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 0).unwrap())
        );

        sweeper.update_settings(Settings {
            enabled: false,
            ..sweeper.settings()
        });
        assert!(sweeper.next_run_in(&Utc).is_none());
    }
}
