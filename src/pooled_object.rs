//! Bookkeeping record attached to every instance a pool has created.
//!
//! The value itself travels by ownership (inside a [`crate::Guard`], an
//! idle-deque entry, or a factory call in flight); `Meta` only tracks the
//! state-machine and timestamps the pool needs to make decisions about an
//! object it currently isn't holding.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const IDLE: u8 = 0;
const ALLOCATED: u8 = 1;
const EVICTION: u8 = 2;
const EVICTION_RETURN_TO_HEAD: u8 = 3;
const INVALID: u8 = 4;

/// Outcome of ending an eviction test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionOutcome {
    /// No concurrent claim happened; caller decides where it goes.
    Normal,
    /// A concurrent `allocate()` raced in during the test; the caller must
    /// reinsert the member at the head of the idle deque untouched.
    ReturnToHead,
    /// The object was invalidated while under test.
    Gone,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The state machine and timestamps tracked for one pooled instance.
#[derive(Debug)]
pub(crate) struct Meta {
    pub id: u64,
    state: AtomicU8,
    created_at: Instant,
    last_borrowed: Mutex<Instant>,
    last_returned: Mutex<Instant>,
}

impl Meta {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: AtomicU8::new(IDLE),
            created_at: now,
            last_borrowed: Mutex::new(now),
            last_returned: Mutex::new(now),
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn mark_returned(&self) {
        *self.last_returned.lock() = Instant::now();
    }

    pub fn mark_borrowed(&self) {
        *self.last_borrowed.lock() = Instant::now();
    }

    /// Time this object has been sitting idle, measured from its last
    /// return (or creation, if never borrowed).
    pub fn idle_time(&self) -> Duration {
        self.last_returned.lock().elapsed()
    }

    /// `Idle -> Allocated`, or, if a concurrent eviction test is in
    /// progress, `Eviction -> EvictionReturnToHead` (returns `false`: the
    /// caller must not use this object; the evictor owns reinserting it).
    pub fn allocate(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            match current {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, ALLOCATED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return true;
                    }
                }
                EVICTION => {
                    if self
                        .state
                        .compare_exchange(EVICTION, EVICTION_RETURN_TO_HEAD, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// `Allocated -> Idle`. Returns `false` if the object was not
    /// allocated (double return).
    pub fn deallocate(&self) -> bool {
        self.state
            .compare_exchange(ALLOCATED, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Idle -> Eviction`.
    pub fn start_eviction_test(&self) -> bool {
        self.state
            .compare_exchange(IDLE, EVICTION, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Ends an eviction test, returning `Idle` (or reporting that a
    /// concurrent borrower claimed the object mid-test).
    pub fn end_eviction_test(&self) -> EvictionOutcome {
        if self
            .state
            .compare_exchange(EVICTION, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return EvictionOutcome::Normal;
        }
        if self
            .state
            .compare_exchange(EVICTION_RETURN_TO_HEAD, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return EvictionOutcome::ReturnToHead;
        }
        EvictionOutcome::Gone
    }

    /// Terminal transition; reachable from any state.
    pub fn invalidate(&self) {
        self.state.store(INVALID, Ordering::Release);
    }
}
