//! Pool configuration.

use std::time::Duration;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a blocked borrower should do when the pool is at capacity with no
/// idle object available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WhenExhausted {
    /// Return [`Error::PoolExhausted`] immediately.
    Fail,
    /// Park the caller on the idle deque's waiter queue until `max_wait`
    /// elapses (or forever, if `max_wait` is `None`).
    Block,
}

/// Configuration for a [`crate::Pool`].
///
/// `max_total`/`max_idle` use `None` for "unbounded" rather than a
/// negative-integer sentinel; `max_wait` uses `None` for "block forever"
/// rather than a non-positive duration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Maximum number of objects the pool will ever have created and not
    /// yet destroyed (active + idle). `None` means unbounded.
    pub max_total: Option<usize>,
    /// Maximum number of idle objects retained; objects returned beyond
    /// this cap are destroyed immediately instead of parked. `None` means
    /// unbounded.
    pub max_idle: Option<usize>,
    /// Number of idle objects the evictor tries to maintain.
    pub min_idle: usize,
    /// How long a blocking borrow waits for an object. `None` blocks
    /// forever.
    pub max_wait: Option<Duration>,
    /// Behavior when the pool is exhausted and no idle object exists.
    pub when_exhausted: WhenExhausted,
    /// Validate an object with `Factory::validate` before handing it to a
    /// borrower.
    pub test_on_borrow: bool,
    /// Validate an object with `Factory::validate` before accepting it
    /// back into the idle set.
    pub test_on_return: bool,
    /// Validate idle objects during evictor runs.
    pub test_while_idle: bool,
    /// Period between evictor runs. `None` (or zero) disables the
    /// evictor entirely.
    pub time_between_eviction_runs: Option<Duration>,
    /// An idle object older than this is always evicted.
    pub min_evictable_idle_time: Duration,
    /// An idle object older than this is evicted only while
    /// `idle_count > min_idle`. `None` disables soft eviction.
    pub soft_min_evictable_idle_time: Option<Duration>,
    /// Objects examined per evictor run. Positive values are an absolute
    /// count; negative values `n` mean `ceil(idle_count / -n)`, matching
    /// commons-pool2's fractional convention.
    pub num_tests_per_eviction_run: i32,
    /// `true`: a returned object is reused before an older idle object
    /// (LIFO). `false`: idle objects are reused in arrival order (FIFO).
    pub lifo: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: Some(8),
            max_idle: Some(8),
            min_idle: 0,
            max_wait: None,
            when_exhausted: WhenExhausted::Block,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: false,
            time_between_eviction_runs: None,
            min_evictable_idle_time: Duration::from_secs(30 * 60),
            soft_min_evictable_idle_time: None,
            num_tests_per_eviction_run: 3,
            lifo: true,
        }
    }
}

impl PoolConfig {
    /// Checks internal consistency; called by [`crate::Pool::new`] and
    /// [`crate::Pool::set_config`].
    pub fn validate(&self) -> Result<()> {
        if let (Some(total), Some(idle)) = (self.max_total, self.max_idle) {
            if idle > total {
                return Err(Error::Configuration(format!(
                    "max_idle ({idle}) cannot exceed max_total ({total})"
                )));
            }
        }
        if let Some(total) = self.max_total {
            if self.min_idle > total {
                return Err(Error::Configuration(format!(
                    "min_idle ({}) cannot exceed max_total ({total})",
                    self.min_idle
                )));
            }
        }
        if self.num_tests_per_eviction_run == 0 {
            return Err(Error::Configuration(
                "num_tests_per_eviction_run must not be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of idle objects to examine in one evictor run, given the
    /// current idle count.
    #[must_use]
    pub(crate) fn eviction_test_count(&self, idle_count: usize) -> usize {
        if self.num_tests_per_eviction_run >= 0 {
            (self.num_tests_per_eviction_run as usize).min(idle_count)
        } else {
            let divisor = (-self.num_tests_per_eviction_run) as usize;
            idle_count.div_ceil(divisor)
        }
    }
}
