//! Moves screenshots off a watched directory on a daily schedule.
//!
//! Files whose names start with a prefix and carry an image extension go to
//! the trash or to a chosen folder. [`schedule::next_run`] turns the configured
//! time of day into the next instant, a [`scheduler::Scheduler`] fires at it,
//! and [`sweeper::Sweeper`] runs the [`cleaner::CleanupEngine`] and re-arms.

pub mod access;
pub mod cleaner;
pub mod config;
pub mod conflict;
pub mod error;
pub mod matcher;
pub mod schedule;
pub mod scheduler;
pub mod state;
pub mod sweeper;
pub mod utils;

pub use cleaner::{CleanupEngine, CleanupResult, Destination, Relocator, SystemRelocator};
pub use config::{DestinationSetting, Settings};
pub use error::{FileFault, SweepError, SweepResult};
pub use matcher::{find_matches, CandidateFile, MatchRule, ScanResult};
pub use schedule::{next_run, previous_run, ScheduleSpec, TimeComponents};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use sweeper::Sweeper;
