//! Core pool implementation

use crate::clock::Clock;
use crate::config::{ExpireFn, NewFn, PoolConfiguration};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{EvictionPolicy, PoolItem};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::scheduler::{Scheduler, TaskControl, TaskHandle};
use crate::store::ItemStore;

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

/// A value checked out with [`Pool::get_pooled`] that is put back when dropped
///
/// If the pool was closed in the meantime the value is handed to the pool's
/// destructor instead.
pub struct PooledObject<T: Send + 'static> {
    value: Option<T>,
    pool: Pool<T>,
}

impl<T: Send + 'static> PooledObject<T> {
    /// Take the value out without returning it to the pool
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("Value already taken")
    }
}

impl<T: Send + 'static> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T: Send + 'static> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T: Send + 'static> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.recycle(value);
        }
    }
}

struct PoolShared<T> {
    name: String,
    items: ItemStore<PoolItem<T>>,
    closed: AtomicBool,
    policy: EvictionPolicy,
    new_fn: Option<NewFn<T>>,
    expire_fn: Option<ExpireFn<T>>,
    clock: Arc<dyn Clock>,
    metrics: MetricsTracker,
    sweep_task: OnceLock<TaskHandle>,
}

impl<T> PoolShared<T> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pop every item through the destructor. The store lock is released
    /// before each call.
    fn drain_with(&self, expire_fn: &ExpireFn<T>) -> usize {
        let mut drained = 0;
        while let Some(item) = self.items.pop_front() {
            expire_fn(item.value);
            drained += 1;
        }
        MetricsTracker::add(&self.metrics.destroyed, drained);
        drained
    }

    fn sweep(&self) -> TaskControl {
        MetricsTracker::incr(&self.metrics.sweep_runs);

        if self.is_closed() {
            if let Some(expire_fn) = &self.expire_fn {
                let drained = self.drain_with(expire_fn);
                debug!(pool = %self.name, drained, "Pool closed, drained remaining items.");
            }
            debug!(pool = %self.name, "Expiration sweep exiting.");
            return TaskControl::Exit;
        }

        if !self.policy.expires() || self.items.is_empty() {
            return TaskControl::Continue;
        }

        // Items are roughly ordered by expiry, so the first live one ends the
        // pass. Expired items behind it wait for a later sweep.
        let now = self.clock.now_millis();
        let mut expired = 0;
        while let Some(item) = self.items.pop_front() {
            if item.expire_at > now {
                self.items.push_front(item);
                break;
            }
            expired += 1;
            if let Some(expire_fn) = &self.expire_fn {
                expire_fn(item.value);
                MetricsTracker::incr(&self.metrics.destroyed);
            }
        }

        MetricsTracker::add(&self.metrics.swept_expired, expired);
        if expired > 0 {
            debug!(
                pool = %self.name,
                expired,
                remaining = self.items.len(),
                "Swept expired items."
            );
        } else {
            trace!(pool = %self.name, "Nothing to sweep.");
        }
        TaskControl::Continue
    }
}

impl<T> Drop for PoolShared<T> {
    fn drop(&mut self) {
        if let Some(expire_fn) = self.expire_fn.take() {
            let drained = self.drain_with(&expire_fn);
            if drained > 0 {
                debug!(pool = %self.name, drained, "Pool dropped, destroyed remaining items.");
            }
        }
        if let Some(task) = self.sweep_task.get() {
            task.cancel();
        }
    }
}

/// Thread-safe object reuse pool with TTL expiration
///
/// Clones share the same pool. A background sweep registered on the
/// [`Scheduler`] at construction removes expired items and, once the pool is
/// closed, tears down whatever is still stored.
///
/// # Examples
///
/// ```
/// use ttlpool::{Pool, PoolConfiguration, PoolError, Scheduler};
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new();
/// let pool = Pool::new(
///     PoolConfiguration::new().with_ttl(Duration::from_secs(60)),
///     &scheduler,
/// );
///
/// pool.put(vec![0u8; 1024]).unwrap();
/// let buf = pool.get().unwrap();
/// assert_eq!(buf.len(), 1024);
///
/// assert!(matches!(pool.get(), Err(PoolError::PoolEmpty)));
/// ```
pub struct Pool<T: Send + 'static> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("policy", &self.shared.policy)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool and register its expiration sweep on `scheduler`
    pub fn new(config: PoolConfiguration<T>, scheduler: &Scheduler) -> Self {
        let PoolConfiguration {
            name,
            time_to_live,
            sweep_interval,
            new_fn,
            expire_fn,
            clock,
        } = config;

        debug!(
            pool = %name,
            ttl_ms = time_to_live.as_millis(),
            sweep_interval_ms = u64::try_from(sweep_interval.as_millis()).unwrap_or(u64::MAX),
            has_new_fn = new_fn.is_some(),
            has_expire_fn = expire_fn.is_some(),
            "Created new pool."
        );

        let shared = Arc::new(PoolShared {
            name,
            items: ItemStore::new(),
            closed: AtomicBool::new(false),
            policy: time_to_live,
            new_fn,
            expire_fn,
            clock,
            metrics: MetricsTracker::new(),
            sweep_task: OnceLock::new(),
        });

        // The task only holds a weak reference so dropping every handle frees the pool.
        let weak = Arc::downgrade(&shared);
        let task = scheduler.register(format!("ttlpool:{}", shared.name), sweep_interval, move || {
            match weak.upgrade() {
                Some(shared) => shared.sweep(),
                None => TaskControl::Exit,
            }
        });
        let _ = shared.sweep_task.set(task);

        Self { shared }
    }

    /// Put a value into the pool
    pub fn put(&self, value: T) -> PoolResult<()> {
        self.try_put(value).map_err(|_| PoolError::PoolClosed)
    }

    /// Put a value, handing it back if the pool is closed
    pub fn try_put(&self, value: T) -> Result<(), T> {
        let shared = &self.shared;
        if shared.is_closed() {
            MetricsTracker::incr(&shared.metrics.rejected_puts);
            return Err(value);
        }

        let item = PoolItem::new(value, &shared.policy, shared.clock.now_millis());
        shared.items.push_back(item);
        MetricsTracker::incr(&shared.metrics.total_put);
        Ok(())
    }

    /// Take a value from the pool, falling back to the constructor
    ///
    /// Expired items met on the way are dropped without calling the
    /// destructor. A constructed value is returned directly and never stored.
    pub fn get(&self) -> PoolResult<T> {
        let shared = &self.shared;

        while !shared.is_closed() {
            let Some(item) = shared.items.pop_front() else {
                break;
            };
            // Immediate items stay usable until the next sweep.
            let usable = shared.policy == EvictionPolicy::Immediate
                || item.is_live(shared.clock.now_millis());
            if usable {
                MetricsTracker::incr(&shared.metrics.total_retrieved);
                return Ok(item.value);
            }
            MetricsTracker::incr(&shared.metrics.lazily_discarded);
            trace!(pool = %shared.name, expire_at = item.expire_at, "Discarded expired item.");
        }

        match &shared.new_fn {
            Some(new_fn) => match new_fn() {
                Ok(value) => {
                    MetricsTracker::incr(&shared.metrics.total_constructed);
                    Ok(value)
                }
                Err(err) => {
                    MetricsTracker::incr(&shared.metrics.construction_failures);
                    warn!(pool = %shared.name, error = %err, "Failed to construct pool item.");
                    Err(PoolError::construction(err))
                }
            },
            None => {
                MetricsTracker::incr(&shared.metrics.pool_empty_events);
                Err(PoolError::PoolEmpty)
            }
        }
    }

    /// Like [`get`](Self::get), but the value goes back into the pool on drop
    pub fn get_pooled(&self) -> PoolResult<PooledObject<T>> {
        let value = self.get()?;
        Ok(PooledObject {
            value: Some(value),
            pool: self.clone(),
        })
    }

    /// Try to take a value without an error
    ///
    /// Every failure becomes `None`, including a constructor error. Use
    /// [`get`](Self::get) to see the cause; failures are still counted in
    /// [`PoolMetrics::construction_failures`] and logged.
    pub fn try_get(&self) -> Option<T> {
        self.get().ok()
    }

    /// Remove every stored item, destroying each one if a destructor is set
    pub fn clear(&self) {
        let shared = &self.shared;
        let removed = match &shared.expire_fn {
            Some(expire_fn) => shared.drain_with(expire_fn),
            None => shared.items.remove_all(),
        };
        debug!(pool = %shared.name, removed, "Cleared pool.");
    }

    /// Close the pool
    ///
    /// New puts fail from now on. Stored items are destroyed by the next
    /// sweep, or immediately by an explicit [`clear`](Self::clear).
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(pool = %self.shared.name, size = self.size(), "Pool closed.");
        }
    }

    /// Number of stored items; advisory under concurrent use
    pub fn size(&self) -> usize {
        self.shared.items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn ttl(&self) -> EvictionPolicy {
        self.shared.policy
    }

    /// Whether the background sweep is still registered with the scheduler
    pub fn is_sweep_registered(&self) -> bool {
        self.shared
            .sweep_task
            .get()
            .is_some_and(TaskHandle::is_registered)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.size(),
            self.is_closed(),
            self.is_sweep_registered(),
            self.shared.new_fn.is_some(),
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.shared.metrics.get_metrics(self.size(), self.is_closed())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format, labelled with the pool name
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), self.name(), tags)
    }

    fn recycle(&self, value: T) {
        if let Err(value) = self.try_put(value) {
            trace!(pool = %self.shared.name, "Pool closed, destroying returned item.");
            if let Some(expire_fn) = &self.shared.expire_fn {
                expire_fn(value);
                MetricsTracker::incr(&self.shared.metrics.destroyed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Harness {
        clock: ManualClock,
        scheduler: Scheduler,
        destroyed: Arc<Mutex<Vec<i32>>>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::new(1_000_000);
            Self {
                scheduler: Scheduler::with_clock(clock.clone()),
                clock,
                destroyed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn config(&self) -> PoolConfiguration<i32> {
            let destroyed = Arc::clone(&self.destroyed);
            PoolConfiguration::new()
                .with_name("test")
                .with_clock(self.clock.clone())
                .with_expire_fn(move |v| destroyed.lock().push(v))
        }

        fn tick(&self) {
            self.clock.advance(Duration::from_secs(1));
            self.scheduler.run_pending();
        }

        fn destroyed(&self) -> Vec<i32> {
            let mut seen = self.destroyed.lock().clone();
            seen.sort_unstable();
            seen
        }
    }

    #[test]
    fn test_put_then_get_returns_value() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);

        pool.put(42).unwrap();
        assert_eq!(pool.get().unwrap(), 42);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_get_is_fifo() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);

        for v in 1..=3 {
            pool.put(v).unwrap();
        }
        assert_eq!(pool.get().unwrap(), 1);
        assert_eq!(pool.get().unwrap(), 2);
        assert_eq!(pool.get().unwrap(), 3);
    }

    #[test]
    fn test_empty_without_constructor() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);

        assert!(matches!(pool.get(), Err(PoolError::PoolEmpty)));
        assert_eq!(pool.get_metrics().pool_empty_events, 1);
    }

    #[test]
    fn test_empty_with_constructor_does_not_store() {
        let h = Harness::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pool = Pool::new(
            h.config().with_new_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }),
            &h.scheduler,
        );

        assert_eq!(pool.get().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_constructor_error_is_passed_through() {
        let h = Harness::new();
        let pool = Pool::new(
            h.config().with_new_fn(|| {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into())
            }),
            &h.scheduler,
        );

        let err = pool.get().unwrap_err();
        assert_eq!(err.to_string(), "refused");
        let source = err.construction_source().unwrap();
        assert_eq!(
            source.downcast_ref::<io::Error>().unwrap().kind(),
            io::ErrorKind::ConnectionRefused
        );
    }

    #[test]
    fn test_try_get_maps_constructor_failure_to_none() {
        let h = Harness::new();
        let pool = Pool::new(
            h.config().with_new_fn(|| Err(io::Error::other("dial failed").into())),
            &h.scheduler,
        );

        assert!(pool.try_get().is_none());
        assert_eq!(pool.get_metrics().construction_failures, 1);

        pool.put(3).unwrap();
        assert_eq!(pool.try_get(), Some(3));
    }

    #[test]
    fn test_size_counts_puts() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);

        for v in 0..5 {
            pool.put(v).unwrap();
        }
        assert_eq!(pool.size(), 5);
    }

    #[test]
    fn test_zero_ttl_never_swept() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);
        pool.put(1).unwrap();

        for _ in 0..10 {
            h.tick();
        }
        h.clock.advance(Duration::from_secs(86_400));
        h.scheduler.run_pending();

        assert_eq!(pool.size(), 1);
        assert_eq!(pool.get().unwrap(), 1);
        assert!(h.destroyed().is_empty());
    }

    #[test]
    fn test_ttl_lazy_expiry_skips_destructor() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_ttl(Duration::from_millis(500)), &h.scheduler);

        pool.put(1).unwrap();
        pool.put(2).unwrap();
        h.clock.advance(Duration::from_millis(499));
        assert_eq!(pool.get().unwrap(), 1);

        h.clock.advance(Duration::from_millis(1));
        assert!(matches!(pool.get(), Err(PoolError::PoolEmpty)));
        assert!(h.destroyed().is_empty());
        assert_eq!(pool.get_metrics().lazily_discarded, 1);
    }

    #[test]
    fn test_lazy_discard_continues_to_live_item() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_ttl(Duration::from_millis(100)), &h.scheduler);

        pool.put(1).unwrap();
        h.clock.advance(Duration::from_millis(150));
        pool.put(2).unwrap();

        assert_eq!(pool.get().unwrap(), 2);
    }

    #[test]
    fn test_sweep_destroys_expired() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_ttl(Duration::from_millis(500)), &h.scheduler);

        pool.put(1).unwrap();
        pool.put(2).unwrap();
        h.tick();

        assert_eq!(pool.size(), 0);
        assert_eq!(h.destroyed(), vec![1, 2]);
        assert_eq!(pool.get_metrics().swept_expired, 2);
    }

    #[test]
    fn test_sweep_stops_at_first_live_item() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_ttl(Duration::from_millis(1_500)), &h.scheduler);

        pool.put(1).unwrap();
        h.clock.advance(Duration::from_millis(1_000));
        pool.put(2).unwrap();

        // 1 expires at +1500, 2 at +2500.
        h.clock.advance(Duration::from_millis(600));
        h.scheduler.run_pending();

        assert_eq!(h.destroyed(), vec![1]);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.get().unwrap(), 2);
    }

    #[test]
    fn test_expired_items_behind_live_one_go_within_few_sweeps() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_ttl(Duration::from_millis(1_500)), &h.scheduler);

        // A wall clock stepping backwards leaves a short-lived item behind a
        // long-lived one.
        h.clock.set(1_005_000);
        pool.put(1).unwrap();
        h.clock.set(1_001_000);
        pool.put(2).unwrap();

        // 2 is already past due but hidden behind 1.
        h.clock.set(1_003_000);
        assert_eq!(h.scheduler.run_pending(), 1);
        assert!(h.destroyed().is_empty());
        assert_eq!(pool.size(), 2);

        for _ in 0..4 {
            h.tick();
        }
        assert_eq!(h.destroyed(), vec![1, 2]);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_immediate_expiry_single_use_before_sweep() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_ttl_millis(-1), &h.scheduler);

        pool.put(1).unwrap();
        assert_eq!(pool.get().unwrap(), 1);

        pool.put(2).unwrap();
        h.tick();
        assert_eq!(pool.size(), 0);
        assert_eq!(h.destroyed(), vec![2]);
        assert!(matches!(pool.get(), Err(PoolError::PoolEmpty)));
    }

    #[test]
    fn test_clear_with_destructor_destroys_each_once() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);

        pool.put(1).unwrap();
        pool.put(2).unwrap();
        pool.clear();

        assert_eq!(pool.size(), 0);
        assert_eq!(h.destroyed(), vec![1, 2]);
    }

    #[test]
    fn test_clear_without_destructor() {
        let h = Harness::new();
        let pool = Pool::new(
            PoolConfiguration::new().with_clock(h.clock.clone()),
            &h.scheduler,
        );

        pool.put(1).unwrap();
        pool.put(2).unwrap();
        pool.clear();
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_close_rejects_puts_and_drains_on_sweep() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);

        pool.put(1).unwrap();
        pool.put(2).unwrap();
        pool.close();

        assert!(matches!(pool.put(3), Err(PoolError::PoolClosed)));
        assert_eq!(pool.size(), 2);
        assert!(h.destroyed().is_empty());

        h.tick();
        assert_eq!(h.destroyed(), vec![1, 2]);
        assert!(!pool.is_sweep_registered());

        // No further sweeps run.
        h.tick();
        assert_eq!(h.destroyed(), vec![1, 2]);
        assert_eq!(pool.get_metrics().sweep_runs, 1);
    }

    #[test]
    fn test_get_after_close_uses_constructor() {
        let h = Harness::new();
        let pool = Pool::new(h.config().with_new_fn(|| Ok(99)), &h.scheduler);

        pool.put(1).unwrap();
        pool.close();
        assert_eq!(pool.get().unwrap(), 99);
    }

    #[test]
    fn test_dropping_last_handle_destroys_items() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);
        let other = pool.clone();

        pool.put(1).unwrap();
        drop(pool);
        assert!(h.destroyed().is_empty());

        drop(other);
        assert_eq!(h.destroyed(), vec![1]);
        assert!(h.scheduler.is_empty());
    }

    #[test]
    fn test_pooled_object_returns_on_drop() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);
        pool.put(5).unwrap();

        {
            let mut obj = pool.get_pooled().unwrap();
            *obj += 1;
            assert_eq!(pool.size(), 0);
        }

        assert_eq!(pool.size(), 1);
        assert_eq!(pool.get().unwrap(), 6);
    }

    #[test]
    fn test_pooled_object_destroyed_when_closed() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);
        pool.put(5).unwrap();

        let obj = pool.get_pooled().unwrap();
        pool.close();
        drop(obj);

        assert_eq!(pool.size(), 0);
        assert_eq!(h.destroyed(), vec![5]);
    }

    #[test]
    fn test_pooled_object_into_inner() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);
        pool.put(5).unwrap();

        let value = pool.get_pooled().unwrap().into_inner();
        assert_eq!(value, 5);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_health_follows_lifecycle() {
        let h = Harness::new();
        let pool = Pool::new(h.config(), &h.scheduler);
        assert!(pool.get_health_status().is_healthy());

        pool.close();
        h.tick();
        let health = pool.get_health_status();
        assert!(!health.is_healthy());
        assert!(health.closed);
        assert!(!health.sweep_registered);
    }
}
