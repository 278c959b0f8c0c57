//! Pool configuration options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::errors::BoxError;
use crate::eviction::EvictionPolicy;

/// Callback that builds a new value when the pool has nothing to hand out.
pub type NewFn<T> = Arc<dyn Fn() -> Result<T, BoxError> + Send + Sync>;

/// Callback that tears down a value the pool is discarding.
pub type ExpireFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Default period of the background expiration sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use ttlpool::{EvictionPolicy, PoolConfiguration};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::<String>::new()
///     .with_name("sessions")
///     .with_ttl(Duration::from_secs(30))
///     .with_new_fn(|| Ok(String::from("fresh")));
///
/// assert_eq!(config.time_to_live, EvictionPolicy::TimeToLive(Duration::from_secs(30)));
/// assert!(config.new_fn.is_some());
/// assert!(config.expire_fn.is_none());
/// ```
pub struct PoolConfiguration<T> {
    /// Name used in log fields and metric labels
    pub name: String,

    /// Expiration policy applied to every item put into the pool
    pub time_to_live: EvictionPolicy,

    /// Period of the background expiration sweep
    pub sweep_interval: Duration,

    /// Value constructor used when the pool is empty
    pub new_fn: Option<NewFn<T>>,

    /// Destructor for expired, cleared and drained values
    pub expire_fn: Option<ExpireFn<T>>,

    /// Time source for expiry timestamps
    pub clock: Arc<dyn Clock>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            time_to_live: EvictionPolicy::None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            new_fn: None,
            expire_fn: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl<T> Clone for PoolConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            time_to_live: self.time_to_live,
            sweep_interval: self.sweep_interval,
            new_fn: self.new_fn.clone(),
            expire_fn: self.expire_fn.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("name", &self.name)
            .field("time_to_live", &self.time_to_live)
            .field("sweep_interval", &self.sweep_interval)
            .field("new_fn", &self.new_fn.is_some())
            .field("expire_fn", &self.expire_fn.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set a positive time-to-live; a zero duration disables expiration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = EvictionPolicy::from_duration(ttl);
        self
    }

    /// Set the time-to-live from signed milliseconds
    ///
    /// Zero never expires, a negative value expires items on the next sweep
    /// and a positive value is a regular deadline.
    ///
    /// # Examples
    ///
    /// ```
    /// use ttlpool::{EvictionPolicy, PoolConfiguration};
    ///
    /// let config = PoolConfiguration::<u8>::new().with_ttl_millis(-1);
    /// assert_eq!(config.time_to_live, EvictionPolicy::Immediate);
    /// ```
    pub fn with_ttl_millis(mut self, ttl: i64) -> Self {
        self.time_to_live = EvictionPolicy::from_millis(ttl);
        self
    }

    /// Mark every stored item stale on insertion
    pub fn with_immediate_expiry(mut self) -> Self {
        self.time_to_live = EvictionPolicy::Immediate;
        self
    }

    /// Set the period of the background sweep
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the constructor used when the pool is empty
    pub fn with_new_fn<F>(mut self, new_fn: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.new_fn = Some(Arc::new(new_fn));
        self
    }

    /// Set the destructor for discarded values
    pub fn with_expire_fn<F>(mut self, expire_fn: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.expire_fn = Some(Arc::new(expire_fn));
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfiguration::<i32>::default();
        assert_eq!(config.time_to_live, EvictionPolicy::None);
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert!(config.new_fn.is_none());
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let config = PoolConfiguration::<i32>::new().with_ttl(Duration::ZERO);
        assert_eq!(config.time_to_live, EvictionPolicy::None);
    }

    #[test]
    fn test_debug_hides_callbacks() {
        let config = PoolConfiguration::<i32>::new().with_expire_fn(|_| {});
        let rendered = format!("{config:?}");
        assert!(rendered.contains("expire_fn: true"));
        assert!(rendered.contains("new_fn: false"));
    }
}
