//! Periodic task scheduler driving pool sweeps
//!
//! A [`Scheduler`] keeps a table of recurring callbacks keyed by [`TaskId`].
//! Each callback decides after every run whether it wants to keep running,
//! returning [`TaskControl::Exit`] to remove its own registration. A task is
//! never run concurrently with itself.
//!
//! The scheduler does not own a thread. It is driven either manually with
//! [`Scheduler::run_pending`], by a dedicated thread from
//! [`Scheduler::spawn_thread`], or from a tokio runtime with
//! [`Scheduler::run_tokio`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};

/// What a task wants after it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    /// Run again after another period
    Continue,

    /// Remove the registration; the task never runs again
    Exit,
}

/// Identity of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Shortest polling interval a driver accepts; smaller values are raised to it.
const MIN_RESOLUTION: Duration = Duration::from_millis(1);

type TaskFn = Box<dyn FnMut() -> TaskControl + Send>;

struct TaskEntry {
    name: String,
    period_ms: i64,
    next_run: AtomicI64,
    callback: Mutex<TaskFn>,
}

struct SchedulerInner {
    tasks: DashMap<TaskId, Arc<TaskEntry>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
    shutdown: watch::Sender<bool>,
}

/// Registration table for recurring callbacks.
///
/// Clones share the same table.
///
/// # Examples
///
/// ```
/// use ttlpool::{ManualClock, Scheduler, TaskControl};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(0);
/// let scheduler = Scheduler::with_clock(clock.clone());
///
/// let mut runs = 0;
/// let handle = scheduler.register("twice", Duration::from_secs(1), move || {
///     runs += 1;
///     if runs == 2 { TaskControl::Exit } else { TaskControl::Continue }
/// });
///
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(scheduler.run_pending(), 1);
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(scheduler.run_pending(), 1);
/// assert!(!handle.is_registered());
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler that reads the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a scheduler on a custom time source.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::with_shared_clock(Arc::new(clock))
    }

    fn with_shared_clock(clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                tasks: DashMap::new(),
                next_id: AtomicU64::new(1),
                clock,
                shutdown,
            }),
        }
    }

    /// Register `callback` to run every `period`, first run one period from now.
    pub fn register<F>(&self, name: impl Into<String>, period: Duration, callback: F) -> TaskHandle
    where
        F: FnMut() -> TaskControl + Send + 'static,
    {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1);
        let name = name.into();
        let now = self.inner.clock.now_millis();

        debug!(task = %id, name = %name, period_ms, "Registering periodic task.");

        self.inner.tasks.insert(
            id,
            Arc::new(TaskEntry {
                name,
                period_ms,
                next_run: AtomicI64::new(now.saturating_add(period_ms)),
                callback: Mutex::new(Box::new(callback)),
            }),
        );

        TaskHandle {
            id,
            scheduler: Arc::downgrade(&self.inner),
        }
    }

    /// Run every task whose deadline has passed. Returns how many ran.
    ///
    /// A task already running on another driver is skipped this round.
    pub fn run_pending(&self) -> usize {
        let now = self.inner.clock.now_millis();

        // Snapshot so no map shard is locked while callbacks run.
        let due: Vec<(TaskId, Arc<TaskEntry>)> = self
            .inner
            .tasks
            .iter()
            .filter(|entry| entry.value().next_run.load(Ordering::Acquire) <= now)
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut ran = 0;
        for (id, entry) in due {
            let Some(mut callback) = entry.callback.try_lock() else {
                continue;
            };
            if !self.inner.tasks.contains_key(&id) {
                continue;
            }

            entry
                .next_run
                .store(now.saturating_add(entry.period_ms), Ordering::Release);

            let control = panic::catch_unwind(AssertUnwindSafe(|| (*callback)()));
            drop(callback);
            ran += 1;

            match control {
                Ok(TaskControl::Continue) => {}
                Ok(TaskControl::Exit) => {
                    debug!(task = %id, name = %entry.name, "Periodic task exited.");
                    self.inner.tasks.remove(&id);
                }
                Err(_) => {
                    warn!(task = %id, name = %entry.name, "Periodic task panicked, deregistering.");
                    self.inner.tasks.remove(&id);
                }
            }
        }
        ran
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }

    /// Stop every driver. Registrations are kept but no longer run.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Drive the scheduler from a dedicated thread, polling every `resolution`.
    ///
    /// Resolutions below one millisecond are raised to one millisecond.
    pub fn spawn_thread(&self, resolution: Duration) -> std::io::Result<SchedulerThread> {
        let resolution = resolution.max(MIN_RESOLUTION);
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let scheduler = self.clone();

        let handle = thread::Builder::new()
            .name("ttlpool-scheduler".into())
            .spawn(move || {
                let resolution_ms = u64::try_from(resolution.as_millis()).unwrap_or(u64::MAX);
                debug!(resolution_ms, "Scheduler thread starting.");
                loop {
                    match stop_rx.recv_timeout(resolution) {
                        Err(RecvTimeoutError::Timeout) if !scheduler.is_shutdown() => {
                            scheduler.run_pending();
                        }
                        _ => break,
                    }
                }
                debug!("Scheduler thread stopped.");
            })?;

        Ok(SchedulerThread {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Drive the scheduler on the current tokio runtime until [`shutdown`](Self::shutdown).
    ///
    /// Callbacks run on the blocking pool so slow destructors do not stall
    /// the runtime's workers. Resolutions below one millisecond are raised to
    /// one millisecond.
    pub async fn run_tokio(&self, resolution: Duration) {
        let resolution = resolution.max(MIN_RESOLUTION);
        let mut shutdown = self.inner.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }

        let mut interval = tokio::time::interval(resolution);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let scheduler = self.clone();
                    if tokio::task::spawn_blocking(move || scheduler.run_pending()).await.is_err() {
                        warn!("Scheduler tick failed to complete.");
                    }
                }
                // Only ever flips to true.
                _ = shutdown.changed() => break,
            }
        }
        debug!("Tokio scheduler driver stopped.");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.inner.tasks.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Registration owned by whoever registered a task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    scheduler: Weak<SchedulerInner>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the task is still in the scheduler's table.
    pub fn is_registered(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|inner| inner.tasks.contains_key(&self.id))
    }

    /// Remove the task. Returns `false` if it was already gone.
    pub fn cancel(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|inner| inner.tasks.remove(&self.id).is_some())
    }
}

/// Background thread driving a [`Scheduler`]; stopped on [`stop`](Self::stop) or drop.
#[derive(Debug)]
pub struct SchedulerThread {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerThread {
    /// Stop the thread and wait for it to finish its current tick.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Scheduler thread panicked.");
            }
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
