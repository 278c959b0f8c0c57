//! Error types for the object pool

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a pool's construction callback.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool is closed")]
    PoolClosed,

    #[error("Pool is empty - no objects available")]
    PoolEmpty,

    /// The construction callback failed. Display is the callback's own message.
    #[error("{0}")]
    Construction(Arc<dyn StdError + Send + Sync + 'static>),
}

impl PoolError {
    /// Wrap an error returned by a construction callback.
    pub fn construction(err: BoxError) -> Self {
        PoolError::Construction(Arc::from(err))
    }

    /// The construction callback's error, if this is a construction failure.
    pub fn construction_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            PoolError::Construction(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PoolError::PoolClosed)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
