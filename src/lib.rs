//! # ttlpool
//!
//! Thread-safe object reuse pool for Rust with per-item time-to-live,
//! custom construction and destruction, and a periodic background sweep.
//!
//! ## Features
//!
//! - Concurrent put/get against a shared double-ended store
//! - TTL policies: never expire, expire on the next sweep, or fixed deadline
//! - Lazy expiration on get, proactive expiration by a background sweep
//! - Optional constructor for empty pools and destructor for discarded items
//! - Close semantics with deferred teardown of stored items
//! - Explicit scheduler, driven manually, by a thread or by tokio
//! - Metrics and Prometheus export, health status
//!
//! ## Quick Start
//!
//! ```rust
//! use ttlpool::{Pool, PoolConfiguration, Scheduler};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//! let _driver = scheduler.spawn_thread(Duration::from_millis(100)).unwrap();
//!
//! let config = PoolConfiguration::new()
//!     .with_name("buffers")
//!     .with_ttl(Duration::from_secs(30))
//!     .with_new_fn(|| Ok(Vec::<u8>::with_capacity(4096)));
//! let pool = Pool::new(config, &scheduler);
//!
//! let buf = pool.get().unwrap();
//! pool.put(buf).unwrap();
//! assert_eq!(pool.size(), 1);
//! ```

mod clock;
mod config;
mod errors;
mod eviction;
mod health;
mod metrics;
mod pool;
mod scheduler;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_SWEEP_INTERVAL, ExpireFn, NewFn, PoolConfiguration};
pub use errors::{BoxError, PoolError, PoolResult};
pub use eviction::EvictionPolicy;
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{Pool, PooledObject};
pub use scheduler::{Scheduler, SchedulerThread, TaskControl, TaskHandle, TaskId};
