//! A one-shot timer that is re-armed by its own callback.
//!
//! At most one fire is pending per [`Scheduler`]. Arming replaces whatever was
//! pending and bumps a generation counter; the worker thread only ever fires
//! the timer that is current when its deadline passes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};

use crate::error::SweepResult;

/// Delays shorter than this are rounded up, so a past deadline cannot spin.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum TimerState {
    Idle,
    Armed {
        deadline: Instant,
        fire_at: DateTime<Utc>,
        generation: u64,
        callback: Callback,
    },
}

struct Inner {
    timer: TimerState,
    generation: u64,
    shutdown: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable control surface for a [`Scheduler`], safe to move into callbacks.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    min_delay: Duration,
}

impl SchedulerHandle {
    /// Arm the timer for `at`, replacing any pending one.
    ///
    /// Past or present instants fire after the minimum delay. Returns the
    /// generation of the new timer.
    pub fn schedule<Tz, F>(&self, at: DateTime<Tz>, callback: F) -> u64
    where
        Tz: TimeZone,
        F: FnOnce() + Send + 'static,
    {
        let fire_at = at.with_timezone(&Utc);
        let delay = fire_at
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(self.min_delay);

        let mut inner = self.shared.lock();
        inner.generation += 1;
        let generation = inner.generation;
        let replaced = matches!(inner.timer, TimerState::Armed { .. });
        inner.timer = TimerState::Armed {
            deadline: Instant::now() + delay,
            fire_at,
            generation,
            callback: Box::new(callback),
        };
        drop(inner);
        self.shared.wake.notify_all();

        tracing::debug!(
            generation,
            replaced,
            fire_at = %fire_at,
            delay_secs = delay.as_secs_f64(),
            "Scheduled timer"
        );
        generation
    }

    /// Drop the pending timer, if any.
    pub fn invalidate(&self) {
        let mut inner = self.shared.lock();
        if let TimerState::Armed { generation, .. } = inner.timer {
            tracing::debug!(generation, "Invalidated timer");
        }
        inner.timer = TimerState::Idle;
        drop(inner);
        self.shared.wake.notify_all();
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.shared.lock().timer, TimerState::Armed { .. })
    }

    /// When the pending timer was asked to fire.
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        match self.shared.lock().timer {
            TimerState::Armed { fire_at, .. } => Some(fire_at),
            TimerState::Idle => None,
        }
    }
}

/// Owns the timer thread. Dropping it stops the thread and discards any
/// pending timer.
pub struct Scheduler {
    handle: SchedulerHandle,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> SweepResult<Self> {
        Self::with_min_delay(DEFAULT_MIN_DELAY)
    }

    pub fn with_min_delay(min_delay: Duration) -> SweepResult<Self> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                timer: TimerState::Idle,
                generation: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("screensweep-timer".into())
            .spawn(move || run_timer(worker_shared))?;

        Ok(Self {
            handle: SchedulerHandle { shared, min_delay },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn schedule<Tz, F>(&self, at: DateTime<Tz>, callback: F) -> u64
    where
        Tz: TimeZone,
        F: FnOnce() + Send + 'static,
    {
        self.handle.schedule(at, callback)
    }

    pub fn invalidate(&self) {
        self.handle.invalidate();
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_armed()
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.handle.next_fire()
    }

    /// Stop the timer thread and wait for it. A callback that is already
    /// running finishes first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        {
            let mut inner = self.handle.shared.lock();
            inner.shutdown = true;
            inner.timer = TimerState::Idle;
        }
        self.handle.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                tracing::error!("Timer thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_timer(shared: Arc<Shared>) {
    let mut inner = shared.lock();
    loop {
        if inner.shutdown {
            inner.timer = TimerState::Idle;
            return;
        }

        let deadline = match &inner.timer {
            TimerState::Idle => {
                inner = shared.wake.wait(inner).unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            TimerState::Armed { deadline, .. } => *deadline,
        };

        let now = Instant::now();
        if now < deadline {
            inner = shared
                .wake
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        // Armed -> Idle before the callback runs, so it can re-arm.
        let fired = std::mem::replace(&mut inner.timer, TimerState::Idle);
        drop(inner);

        if let TimerState::Armed {
            generation,
            callback,
            ..
        } = fired
        {
            tracing::debug!(generation, "Timer fired");
            if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                tracing::error!(generation, "Timer callback panicked");
            }
        }

        inner = shared.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn fast() -> Scheduler {
        Scheduler::with_min_delay(Duration::from_millis(10)).unwrap()
    }

    fn in_millis(ms: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_default_min_delay_is_one_second() {
        let scheduler = Scheduler::new().unwrap();
        assert_eq!(scheduler.handle.min_delay, Duration::from_secs(1));
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn test_fires_once() {
        let scheduler = fast();
        let (tx, rx) = mpsc::channel();

        scheduler.schedule(in_millis(50), move || {
            let _ = tx.send(());
        });
        assert!(scheduler.is_armed());

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn test_rearm_replaces_pending_timer() {
        let scheduler = fast();
        let (tx, rx) = mpsc::channel();

        let first_tx = tx.clone();
        let first = scheduler.schedule(in_millis(150), move || {
            let _ = first_tx.send("first");
        });
        let second = scheduler.schedule(in_millis(30), move || {
            let _ = tx.send("second");
        });
        assert_eq!(second, first + 1);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_invalidate_cancels() {
        let scheduler = fast();
        let (tx, rx) = mpsc::channel::<()>();

        scheduler.schedule(in_millis(50), move || {
            let _ = tx.send(());
        });
        scheduler.invalidate();
        assert!(!scheduler.is_armed());
        assert!(scheduler.next_fire().is_none());
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        // No-op when already idle.
        scheduler.invalidate();
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn test_past_instant_fires_after_floor() {
        let scheduler = Scheduler::with_min_delay(Duration::from_millis(50)).unwrap();
        let (tx, rx) = mpsc::channel();

        let start = Instant::now();
        scheduler.schedule(Utc::now() - chrono::Duration::hours(1), move || {
            let _ = tx.send(Instant::now());
        });

        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(50));
    }

    #[test]
    fn test_callback_can_rearm() {
        let scheduler = fast();
        let handle = scheduler.handle();
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        fn arm(handle: SchedulerHandle, count: Arc<AtomicUsize>, tx: mpsc::Sender<usize>) {
            let next = handle.clone();
            handle.schedule(Utc::now(), move || {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = tx.send(n);
                if n < 3 {
                    arm(next, count, tx);
                }
            });
        }

        arm(handle, Arc::clone(&count), tx);
        for expected in 1..=3 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), expected);
        }
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_callback_keeps_timer_alive() {
        let scheduler = fast();
        scheduler.schedule(Utc::now(), || panic!("boom"));
        std::thread::sleep(Duration::from_millis(100));

        let (tx, rx) = mpsc::channel();
        scheduler.schedule(Utc::now(), move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_next_fire_reports_requested_instant() {
        let scheduler = fast();
        let at = in_millis(60_000);
        scheduler.schedule(at, || {});
        assert_eq!(scheduler.next_fire(), Some(at));
    }

    #[test]
    fn test_shutdown_drops_pending() {
        let scheduler = fast();
        let (tx, rx) = mpsc::channel::<()>();
        scheduler.schedule(in_millis(50), move || {
            let _ = tx.send(());
        });
        scheduler.shutdown();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
