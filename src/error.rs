//! Error types returned by pool operations.

use std::time::Duration;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by a [`crate::Pool`] or a [`crate::Factory`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pool has been closed via [`crate::Pool::close`].
    #[error("pool has been closed")]
    PoolClosed,

    /// No idle object was available and the pool is at `max_total`
    /// capacity; returned immediately when `when_exhausted` is `Fail`.
    #[error("pool exhausted: no idle object available and max_total reached")]
    PoolExhausted,

    /// A blocking borrow waited `max_wait` without an object becoming
    /// available.
    #[error("timed out after {0:?} waiting for an idle object")]
    BorrowTimeout(Duration),

    /// The object passed to `return_object`/`invalidate_object` is not
    /// tracked by this pool (wrong pool, or already destroyed).
    #[error("object is not part of this pool")]
    NotInPool,

    /// The object was already returned (double return).
    #[error("object has already been returned to this pool")]
    AlreadyReturned,

    /// A [`crate::Factory`] hook failed.
    #[error("factory operation '{operation}' failed")]
    FactoryFailure {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `set_factory` was called on a pool that already has an active
    /// factory and live objects.
    #[error("factory has already been set on this pool")]
    FactoryAlreadySet,

    /// A blocking borrow was cancelled before it could complete.
    #[error("borrow was cancelled")]
    Interrupted,

    /// The supplied [`crate::PoolConfig`] failed validation.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether retrying the same operation might succeed without
    /// intervention (as opposed to a programming error like
    /// [`Error::NotInPool`]).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::PoolExhausted | Error::BorrowTimeout(_) | Error::Interrupted
        )
    }

    /// Builds a [`Error::FactoryFailure`], for a [`crate::Factory`]
    /// implementation reporting its own `make`/`activate`/`validate`
    /// failure back through this crate's error type.
    #[must_use]
    pub fn factory(operation: &'static str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::FactoryFailure { operation, source: source.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::PoolExhausted.is_retryable());
        assert!(Error::BorrowTimeout(Duration::from_secs(1)).is_retryable());
        assert!(Error::Interrupted.is_retryable());
        assert!(!Error::PoolClosed.is_retryable());
        assert!(!Error::NotInPool.is_retryable());
        assert!(!Error::AlreadyReturned.is_retryable());
    }

    #[test]
    fn factory_failure_carries_source() {
        let err = Error::factory("make", "boom".to_string());
        let msg = err.to_string();
        assert!(msg.contains("make"));
    }
}
