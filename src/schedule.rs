//! Daily run times and the calendar math that turns them into instants.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SweepError;

/// How many local days ahead `next_run` looks before giving up.
const SEARCH_DAYS: u64 = 8;

/// A time of day at which the cleanup repeats, every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleSpec {
    hour: u32,
    minute: u32,
}

impl ScheduleSpec {
    pub fn new(hour: u32, minute: u32) -> Result<Self, SweepError> {
        if hour > 23 || minute > 59 {
            return Err(SweepError::InvalidTime(format!(
                "{hour}:{minute:02} is not a valid time of day"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            hour: 23,
            minute: 59,
        }
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ScheduleSpec {
    type Err = SweepError;

    /// Parses `HH:MM` (24-hour clock).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SweepError::InvalidTime(format!("expected HH:MM, got '{s}'"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = h.parse().map_err(|_| invalid())?;
        let minute = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ScheduleSpec {
    type Error = SweepError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ScheduleSpec> for String {
    fn from(spec: ScheduleSpec) -> Self {
        spec.to_string()
    }
}

/// Partial wall-clock components. Unset fields match any value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeComponents {
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    /// Accepted for symmetry, always treated as 0.
    pub second: Option<u32>,
}

impl TimeComponents {
    pub fn hm(hour: u32, minute: u32) -> Self {
        Self {
            hour: Some(hour),
            minute: Some(minute),
            second: None,
        }
    }
}

impl From<ScheduleSpec> for TimeComponents {
    fn from(spec: ScheduleSpec) -> Self {
        Self::hm(spec.hour, spec.minute)
    }
}

/// Map a local wall-clock time to an instant.
///
/// Repeated times take the earlier occurrence. Times inside a DST gap are
/// read with the offset from before the jump, which lands them the same
/// distance past the gap (02:30 in a 02:00-03:00 gap becomes 03:30).
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt);
    }
    let before = tz.from_local_datetime(&(local - Duration::days(1))).earliest()?;
    let offset = before.offset().fix().local_minus_utc();
    let utc = local - Duration::seconds(i64::from(offset));
    Some(tz.from_utc_datetime(&utc))
}

/// The first instant strictly after `now` whose wall clock in `tz` reads
/// `target` with zero seconds.
///
/// Being exactly at the target counts as already passed. Returns `now` only
/// when nothing matches within a week, which valid targets never hit.
pub fn next_run<Tz: TimeZone>(
    target: TimeComponents,
    now: &DateTime<Tz>,
    tz: &Tz,
) -> DateTime<Tz> {
    let local_now = now.with_timezone(tz).naive_local();
    let hours: Vec<u32> = match target.hour {
        Some(h) => vec![h],
        None => (0..24).collect(),
    };
    let minutes: Vec<u32> = match target.minute {
        Some(m) => vec![m],
        None => (0..60).collect(),
    };

    let mut day = local_now.date();
    for _ in 0..SEARCH_DAYS {
        for &hour in &hours {
            for &minute in &minutes {
                let Some(local) = day.and_hms_opt(hour, minute, 0) else {
                    continue;
                };
                if let Some(candidate) = resolve_local(tz, local) {
                    if candidate > *now {
                        return candidate;
                    }
                }
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    tracing::warn!(components = ?target, "No upcoming run time found, falling back to now");
    now.with_timezone(tz)
}

/// The most recent occurrence of `spec` at or before `now`.
pub fn previous_run<Tz: TimeZone>(
    spec: ScheduleSpec,
    now: &DateTime<Tz>,
    tz: &Tz,
) -> Option<DateTime<Tz>> {
    let today = now.with_timezone(tz).date_naive();
    let local = today.and_hms_opt(spec.hour, spec.minute, 0)?;
    let candidate = resolve_local(tz, local)?;
    if candidate <= *now {
        return Some(candidate);
    }
    let yesterday = today.pred_opt()?.and_hms_opt(spec.hour, spec.minute, 0)?;
    resolve_local(tz, yesterday)
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
