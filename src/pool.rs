//! The pool coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::{PoolConfig, WhenExhausted};
use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::guard::Guard;
use crate::idle_deque::{Entry, IdleDeque};
use crate::pooled_object::{EvictionOutcome, Meta};
use crate::scheduler::{EvictorScheduler, TaskHandle};

/// A point-in-time snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub created: u64,
    pub destroyed: u64,
    pub borrowed: u64,
    pub returned: u64,
    pub eviction_runs: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    borrowed: AtomicU64,
    returned: AtomicU64,
    eviction_runs: AtomicU64,
    evicted: AtomicU64,
}

struct Inner<F: Factory> {
    // `Mutex<Arc<F>>` rather than a bare `F` so `Pool::set_factory` can swap
    // the whole factory out; holders take a cheap `Arc` clone and never hold
    // this lock across a factory call (Invariant 5).
    factory: Mutex<Arc<F>>,
    config: ArcSwap<PoolConfig>,
    idle: IdleDeque<F::Instance>,
    all_objects: DashMap<u64, Arc<Meta>>,
    create_count: AtomicUsize,
    closed: AtomicBool,
    counters: Counters,
    evictor: Mutex<Option<TaskHandle>>,
}

/// A generic, thread-safe, bounded object pool.
///
/// Cloning a `Pool` is cheap (it clones an `Arc`); every clone shares the
/// same idle set, capacity accounting and evictor.
pub struct Pool<F: Factory>(Arc<Inner<F>>);

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Pool(self.0.clone())
    }
}

impl<F: Factory> Pool<F> {
    /// Builds a pool around `factory`, validating `config` first.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new(Inner {
            factory: Mutex::new(Arc::new(factory)),
            config: ArcSwap::new(Arc::new(config)),
            idle: IdleDeque::new(),
            all_objects: DashMap::new(),
            create_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
            evictor: Mutex::new(None),
        });

        // Always schedule, even if eviction starts disabled: the scheduler
        // re-reads `time_between_eviction_runs` from the live config before
        // every wait, so a later `set_config` can enable, disable, or
        // reperiod the evictor on an already-running pool.
        let weak_for_period = Arc::downgrade(&inner);
        let weak_for_task = weak_for_period.clone();
        let handle = EvictorScheduler::schedule(
            move || weak_for_period.upgrade().and_then(|inner| inner.config.load().time_between_eviction_runs),
            move || {
                let weak = weak_for_task.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        Pool(inner).run_eviction().await;
                    }
                }
            },
        );
        *inner.evictor.lock() = Some(handle);

        Ok(Pool(inner))
    }

    /// Borrows an object, creating one if capacity allows and none is
    /// idle, or blocking/failing per `when_exhausted` otherwise.
    pub async fn borrow_object(&self) -> Result<Guard<F>> {
        if self.0.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        let config = self.0.config.load_full();

        loop {
            if let Some(entry) = self.0.idle.try_pop_front() {
                if let Some(guard) = self.claim_from_idle(entry, &config).await? {
                    return Ok(guard);
                }
                continue;
            }

            if self.try_begin_create(&config) {
                return self.create_fresh(&config).await;
            }

            match config.when_exhausted {
                WhenExhausted::Fail => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("pool exhausted, when_exhausted=Fail");
                    return Err(Error::PoolExhausted);
                }
                WhenExhausted::Block => match self.0.idle.wait_pop_front(config.max_wait).await {
                    Some(entry) => {
                        if let Some(guard) = self.claim_from_idle(entry, &config).await? {
                            return Ok(guard);
                        }
                        continue;
                    }
                    None => {
                        if self.0.closed.load(Ordering::Acquire) {
                            return Err(Error::PoolClosed);
                        }
                        return Err(Error::BorrowTimeout(config.max_wait.unwrap_or_default()));
                    }
                },
            }
        }
    }

    /// Pre-warms the pool with one additional idle object, capacity
    /// permitting.
    pub async fn add_object(&self) -> Result<()> {
        if self.0.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        let config = self.0.config.load_full();
        let factory = self.factory();
        if !self.try_begin_create(&config) {
            return Err(Error::PoolExhausted);
        }
        match factory.make().await {
            Ok(mut value) => {
                let meta = Arc::new(Meta::new());
                self.0.all_objects.insert(meta.id, meta.clone());
                self.0.counters.created.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = factory.passivate(&mut value).await {
                    self.destroy_member(meta, value).await;
                    return Err(e);
                }
                meta.mark_returned();
                if config.lifo {
                    self.0.idle.push_front(Entry { meta, value });
                } else {
                    self.0.idle.push_back(Entry { meta, value });
                }
                Ok(())
            }
            Err(e) => {
                self.0.create_count.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// Returns a snapshot of current pool activity.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let idle = self.0.idle.len();
        PoolStats {
            active: self.0.create_count.load(Ordering::Relaxed).saturating_sub(idle),
            idle,
            created: self.0.counters.created.load(Ordering::Relaxed),
            destroyed: self.0.counters.destroyed.load(Ordering::Relaxed),
            borrowed: self.0.counters.borrowed.load(Ordering::Relaxed),
            returned: self.0.counters.returned.load(Ordering::Relaxed),
            eviction_runs: self.0.counters.eviction_runs.load(Ordering::Relaxed),
            evicted: self.0.counters.evicted.load(Ordering::Relaxed),
        }
    }

    /// The currently active configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<PoolConfig> {
        self.0.config.load_full()
    }

    /// Installs a new configuration atomically. In-flight operations keep
    /// using the snapshot they already read. The evictor reads
    /// `time_between_eviction_runs` fresh from the live config before every
    /// wait, so this call can enable, disable, or reperiod a running pool's
    /// evictor as well — the new value takes effect on the evictor's next
    /// wait, not immediately.
    pub fn set_config(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;
        self.0.config.store(Arc::new(config));
        Ok(())
    }

    /// Replaces the pool's factory, but only while no member is tracked in
    /// `all_objects` — rebinding under live objects would let outstanding
    /// guards outlive the factory that knows how to destroy them. The lock
    /// held here makes "check empty, then swap" atomic against a
    /// concurrent `set_factory`; it is never held across a factory call.
    pub fn set_factory(&self, factory: F) -> Result<()> {
        let mut current = self.0.factory.lock();
        if !self.0.all_objects.is_empty() {
            return Err(Error::FactoryAlreadySet);
        }
        *current = Arc::new(factory);
        Ok(())
    }

    fn factory(&self) -> Arc<F> {
        self.0.factory.lock().clone()
    }

    /// Destroys every currently idle object. Active (borrowed) objects are
    /// unaffected until they are returned.
    pub async fn clear(&self) {
        for entry in self.0.idle.drain() {
            self.destroy_member(entry.meta, entry.value).await;
        }
    }

    /// Closes the pool: stops the evictor, destroys idle objects, and
    /// wakes every blocked borrower with [`Error::PoolClosed`]. Safe to
    /// call more than once.
    pub async fn close(&self) {
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.0.evictor.lock().take() {
            EvictorScheduler::cancel(handle);
        }
        for entry in self.0.idle.close() {
            self.destroy_member(entry.meta, entry.value).await;
        }
    }

    /// Whether [`Pool::close`] has already been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    // -- internal --

    pub(crate) async fn return_object(&self, id: u64, value: F::Instance) {
        let Some(meta) = self.0.all_objects.get(&id).map(|r| r.clone()) else {
            let _err = Error::NotInPool;
            #[cfg(feature = "tracing")]
            tracing::warn!(id, error = %_err, "returned object not tracked by this pool");
            return;
        };

        let config = self.0.config.load_full();
        let factory = self.factory();
        let mut value = value;

        if config.test_on_return && !factory.validate(&value).await {
            self.destroy_member(meta, value).await;
            return;
        }
        if factory.passivate(&mut value).await.is_err() {
            self.destroy_member(meta, value).await;
            return;
        }
        if !meta.deallocate() {
            let _err = Error::AlreadyReturned;
            #[cfg(feature = "tracing")]
            tracing::warn!(id, error = %_err, "object already returned to pool");
            return;
        }
        self.0.counters.returned.fetch_add(1, Ordering::Relaxed);

        if self.0.closed.load(Ordering::Acquire) {
            self.destroy_member(meta, value).await;
            return;
        }

        meta.mark_returned();
        let entry = Entry { meta, value };
        if config.lifo {
            self.0.idle.push_front(entry);
        } else {
            self.0.idle.push_back(entry);
        }

        // If parking this return pushed the idle set over `max_idle`, make
        // room by discarding the stalest member rather than rejecting the
        // object that was just returned — the freshest return survives,
        // the longest-idle one goes.
        if let Some(max) = config.max_idle {
            while self.0.idle.len() > max {
                let stale = if config.lifo { self.0.idle.try_pop_back() } else { self.0.idle.try_pop_front() };
                let Some(stale) = stale else { break };
                self.destroy_member(stale.meta, stale.value).await;
            }
        }
    }

    pub(crate) async fn invalidate_object(&self, id: u64, value: F::Instance) -> Result<()> {
        let Some(meta) = self.0.all_objects.get(&id).map(|r| r.clone()) else {
            return Err(Error::NotInPool);
        };
        self.0.all_objects.remove(&id);
        self.0.create_count.fetch_sub(1, Ordering::AcqRel);
        meta.invalidate();
        self.0.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        self.factory().destroy(value).await
    }

    async fn claim_from_idle(&self, entry: Entry<F::Instance>, config: &PoolConfig) -> Result<Option<Guard<F>>> {
        let Entry { meta, value } = entry;
        if !meta.allocate() {
            // Lost the race to the evictor; the evictor owns this object's
            // fate now, discard our reference without destroying it.
            return Ok(None);
        }

        let factory = self.factory();
        let mut value = value;
        if factory.activate(&mut value).await.is_err() {
            // Like a validation failure, an activation failure on a reused
            // idle object is swallowed and retried rather than surfaced.
            self.destroy_member(meta, value).await;
            return Ok(None);
        }
        if config.test_on_borrow && !factory.validate(&value).await {
            self.destroy_member(meta, value).await;
            return Ok(None);
        }

        meta.mark_borrowed();
        self.0.counters.borrowed.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Guard::new(meta.id, value, self.clone())))
    }

    async fn create_fresh(&self, config: &PoolConfig) -> Result<Guard<F>> {
        let factory = self.factory();
        match factory.make().await {
            Ok(value) => {
                let meta = Arc::new(Meta::new());
                self.0.all_objects.insert(meta.id, meta.clone());
                self.0.counters.created.fetch_add(1, Ordering::Relaxed);
                let allocated = meta.allocate();
                debug_assert!(allocated, "freshly created object must start Idle");

                let mut value = value;
                if let Err(e) = factory.activate(&mut value).await {
                    self.0.all_objects.remove(&meta.id);
                    self.0.create_count.fetch_sub(1, Ordering::AcqRel);
                    meta.invalidate();
                    self.0.counters.destroyed.fetch_add(1, Ordering::Relaxed);
                    let _ = factory.destroy(value).await;
                    return Err(e);
                }
                if config.test_on_borrow && !factory.validate(&value).await {
                    self.0.all_objects.remove(&meta.id);
                    self.0.create_count.fetch_sub(1, Ordering::AcqRel);
                    meta.invalidate();
                    self.0.counters.destroyed.fetch_add(1, Ordering::Relaxed);
                    let _ = factory.destroy(value).await;
                    return Err(Error::factory("validate", "newly created instance failed validation"));
                }

                meta.mark_borrowed();
                self.0.counters.borrowed.fetch_add(1, Ordering::Relaxed);
                Ok(Guard::new(meta.id, value, self.clone()))
            }
            Err(e) => {
                self.0.create_count.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn try_begin_create(&self, config: &PoolConfig) -> bool {
        match config.max_total {
            None => {
                self.0.create_count.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(max) => loop {
                let current = self.0.create_count.load(Ordering::Acquire);
                if current >= max {
                    return false;
                }
                if self
                    .0
                    .create_count
                    .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
            },
        }
    }

    async fn destroy_member(&self, meta: Arc<Meta>, value: F::Instance) {
        self.0.all_objects.remove(&meta.id);
        self.0.create_count.fetch_sub(1, Ordering::AcqRel);
        meta.invalidate();
        self.0.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        if let Err(_e) = self.factory().destroy(value).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "factory destroy failed during pool-internal cleanup; swallowed");
        }
    }

    async fn run_eviction(&self) {
        if self.0.closed.load(Ordering::Acquire) {
            return;
        }
        let config = self.0.config.load_full();
        let tests = config.eviction_test_count(self.0.idle.len());
        self.0.counters.eviction_runs.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::debug!(tests, "evictor run starting");

        for _ in 0..tests {
            let candidate = if config.lifo { self.0.idle.try_pop_back() } else { self.0.idle.try_pop_front() };
            let Some(entry) = candidate else { break };
            self.evict_or_keep(entry, &config).await;
        }

        self.ensure_min_idle(&config).await;
    }

    async fn evict_or_keep(&self, entry: Entry<F::Instance>, config: &PoolConfig) {
        let Entry { meta, value } = entry;
        if !meta.start_eviction_test() {
            // Not Idle anymore (shouldn't happen under our exclusive-pop
            // design, but stay defensive); park it back untouched.
            let entry = Entry { meta, value };
            if config.lifo {
                self.0.idle.push_back(entry);
            } else {
                self.0.idle.push_front(entry);
            }
            return;
        }

        let idle_time = meta.idle_time();
        let hard_evict = idle_time > config.min_evictable_idle_time;
        // `self.0.idle.len()` no longer counts the member under test (it
        // was just popped off to run this test), so compare against
        // `min_idle` as if it were still there; otherwise the floor would
        // settle one above `min_idle` instead of at it.
        let soft_evict = !hard_evict
            && config
                .soft_min_evictable_idle_time
                .is_some_and(|soft| idle_time > soft)
            && self.0.idle.len() + 1 > config.min_idle;

        if hard_evict || soft_evict {
            let _ = meta.end_eviction_test();
            self.0.counters.evicted.fetch_add(1, Ordering::Relaxed);
            self.destroy_member(meta, value).await;
            return;
        }

        let mut value = value;
        if config.test_while_idle {
            let factory = self.factory();
            let healthy = factory.activate(&mut value).await.is_ok()
                && factory.validate(&value).await
                && factory.passivate(&mut value).await.is_ok();
            if !healthy {
                let _ = meta.end_eviction_test();
                self.0.counters.evicted.fetch_add(1, Ordering::Relaxed);
                self.destroy_member(meta, value).await;
                return;
            }
        }

        match meta.end_eviction_test() {
            EvictionOutcome::ReturnToHead => self.0.idle.push_front(Entry { meta, value }),
            EvictionOutcome::Normal | EvictionOutcome::Gone => {
                let entry = Entry { meta, value };
                if config.lifo {
                    self.0.idle.push_back(entry);
                } else {
                    self.0.idle.push_front(entry);
                }
            }
        }
    }

    async fn ensure_min_idle(&self, config: &PoolConfig) {
        let factory = self.factory();
        while self.0.idle.len() < config.min_idle {
            if !self.try_begin_create(config) {
                break;
            }
            match factory.make().await {
                Ok(mut value) => {
                    let meta = Arc::new(Meta::new());
                    self.0.all_objects.insert(meta.id, meta.clone());
                    self.0.counters.created.fetch_add(1, Ordering::Relaxed);
                    if factory.passivate(&mut value).await.is_err() {
                        self.destroy_member(meta, value).await;
                        break;
                    }
                    meta.mark_returned();
                    self.0.idle.push_back(Entry { meta, value });
                }
                Err(_e) => {
                    self.0.create_count.fetch_sub(1, Ordering::AcqRel);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_e, "min_idle top-up failed; will retry next evictor run");
                    break;
                }
            }
        }
    }
}

impl<F: Factory + std::fmt::Debug> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("stats", &self.stats()).field("closed", &self.is_closed()).finish()
    }
}

// White-box tests for `return_object`/`invalidate_object`: both are
// `pub(crate)`, invoked in production only from `Guard::drop`/
// `Guard::invalidate`, so the `NotInPool` and `AlreadyReturned` swallow
// paths (an unknown id, and a second return of the same id) are only
// reachable directly from here.
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingFactory {
        next: AtomicU32,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self { next: AtomicU32::new(0) }
        }
    }

    impl Factory for CountingFactory {
        type Instance = u32;

        async fn make(&self) -> Result<u32> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn returning_an_untracked_id_is_a_silent_no_op() {
        let pool = Pool::new(CountingFactory::new(), PoolConfig::default()).unwrap();

        pool.return_object(999, 42).await;

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn invalidating_an_untracked_id_raises_not_in_pool() {
        let pool = Pool::new(CountingFactory::new(), PoolConfig::default()).unwrap();

        let err = pool.invalidate_object(999, 42).await.unwrap_err();
        assert!(matches!(err, Error::NotInPool));
    }

    #[tokio::test]
    async fn second_return_of_the_same_member_is_a_silent_no_op() {
        let pool = Pool::new(CountingFactory::new(), PoolConfig::default()).unwrap();

        let guard = pool.borrow_object().await.unwrap();
        let id = guard.id();
        let value = *guard;
        // Bypass `Drop`'s spawned return so this test can call
        // `return_object` directly without racing it.
        std::mem::forget(guard);

        pool.return_object(id, value).await;
        assert_eq!(pool.stats().idle, 1);
        assert_eq!(pool.stats().active, 0);

        // The member is already deallocated; a second return for the same
        // id must leave the pool exactly as it was, not double-park it.
        pool.return_object(id, value).await;
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
    }
}
