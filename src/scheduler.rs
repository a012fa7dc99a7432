//! Process-wide registry for evictor tasks.
//!
//! Commons Pool2 runs every pool's evictor on one shared `Timer` thread so
//! N pools don't cost N background threads. Tokio's multiplexed runtime
//! already gives spawned tasks that property, so this registry's job is
//! bookkeeping (assigning a cancellable handle per pool) and orderly
//! shutdown on `Pool::close`, not thread management.

use std::future::Future;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled evictor task; cancel it with
/// [`EvictorScheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskHandle(u64);

struct Registry {
    tasks: DashMap<u64, CancellationToken>,
    next_id: AtomicU64,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry { tasks: DashMap::new(), next_id: AtomicU64::new(1) })
}

/// How often a task with no configured period (disabled, or momentarily
/// between `set_config` calls) re-checks whether one has since appeared.
const DISABLED_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct EvictorScheduler;

impl EvictorScheduler {
    /// Spawns `task` to run on a period read fresh from `period` before
    /// every wait, returning a handle that can cancel it. Re-reading the
    /// period on each iteration — rather than capturing it once at spawn
    /// time — is what lets `Pool::set_config` change (or enable/disable)
    /// `time_between_eviction_runs` on a running pool: the next wait picks
    /// up the new value instead of the task running forever on whatever
    /// period was in effect when it was scheduled. A `None`/zero period
    /// parks the task on [`DISABLED_POLL_INTERVAL`] without running `task`,
    /// so enabling eviction later is noticed within one poll interval. The
    /// first call lazily initializes the shared registry; the underlying
    /// Tokio task exits as soon as it is cancelled, so nothing is torn down
    /// explicitly when the registry becomes empty.
    pub fn schedule<P, F, Fut>(mut period: P, mut task: F) -> TaskHandle
    where
        P: FnMut() -> Option<Duration> + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let reg = registry();
        let id = reg.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        reg.tasks.insert(id, token.clone());

        tokio::spawn(async move {
            loop {
                let wait = period().filter(|p| !p.is_zero()).unwrap_or(DISABLED_POLL_INTERVAL);
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(wait) => {
                        // Re-check after waking: a concurrent `set_config`
                        // may have disabled eviction while this task slept.
                        if period().is_some_and(|p| !p.is_zero()) {
                            task().await;
                        }
                    }
                }
            }
        });

        TaskHandle(id)
    }

    /// Cancels a previously scheduled task. Idempotent.
    pub fn cancel(handle: TaskHandle) {
        if let Some((_, token)) = registry().tasks.remove(&handle.0) {
            token.cancel();
        }
    }

    #[cfg(test)]
    pub fn active_count() -> usize {
        registry().tasks.len()
    }
}
