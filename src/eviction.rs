//! Eviction policies and the stored item wrapper

use std::time::Duration;

/// Time-to-live policy for pool items.
///
/// The policy is fixed when the pool is created.
///
/// # Examples
///
/// ```
/// use ttlpool::EvictionPolicy;
/// use std::time::Duration;
///
/// assert_eq!(EvictionPolicy::from_millis(0), EvictionPolicy::None);
/// assert_eq!(EvictionPolicy::from_millis(-1), EvictionPolicy::Immediate);
/// assert_eq!(
///     EvictionPolicy::from_millis(1500),
///     EvictionPolicy::TimeToLive(Duration::from_millis(1500)),
/// );
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Items never expire (TTL of zero)
    #[default]
    None,

    /// Items are stale as soon as they are stored (negative TTL)
    ///
    /// A `get` that reaches the item before the next sweep still hands it
    /// out; the next sweep destroys whatever is left.
    Immediate,

    /// Items expire a fixed duration after they were put (positive TTL)
    TimeToLive(Duration),
}

impl EvictionPolicy {
    /// Build a policy from a signed millisecond TTL.
    pub fn from_millis(ttl: i64) -> Self {
        match ttl {
            0 => EvictionPolicy::None,
            t if t < 0 => EvictionPolicy::Immediate,
            t => EvictionPolicy::TimeToLive(Duration::from_millis(t.unsigned_abs())),
        }
    }

    /// Build a policy from a duration; a zero duration never expires.
    pub fn from_duration(ttl: Duration) -> Self {
        if ttl.is_zero() {
            EvictionPolicy::None
        } else {
            EvictionPolicy::TimeToLive(ttl)
        }
    }

    /// Signed millisecond form of the policy.
    pub fn as_millis(&self) -> i64 {
        match self {
            EvictionPolicy::None => 0,
            EvictionPolicy::Immediate => -1,
            EvictionPolicy::TimeToLive(ttl) => {
                i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
            }
        }
    }

    /// Whether items can ever expire under this policy.
    pub fn expires(&self) -> bool {
        !matches!(self, EvictionPolicy::None)
    }

    /// Expiry timestamp for an item inserted at `now`. Zero means never.
    pub(crate) fn expire_at(&self, now: i64) -> i64 {
        match self {
            EvictionPolicy::None => 0,
            // The insertion instant itself: any later check sees it as past due.
            EvictionPolicy::Immediate => now.max(1),
            EvictionPolicy::TimeToLive(_) => now.saturating_add(self.as_millis()),
        }
    }
}

/// An available value together with its expiry timestamp.
#[derive(Debug)]
pub(crate) struct PoolItem<T> {
    pub value: T,
    /// Milliseconds since the epoch, `0` for never. Set once on insertion.
    pub expire_at: i64,
}

impl<T> PoolItem<T> {
    pub fn new(value: T, policy: &EvictionPolicy, now: i64) -> Self {
        Self {
            value,
            expire_at: policy.expire_at(now),
        }
    }

    /// Lazy check used on the acquisition path.
    pub fn is_live(&self, now: i64) -> bool {
        self.expire_at == 0 || self.expire_at > now
    }
}
