//! The idle object set, with FIFO-fair handoff to blocked borrowers.
//!
//! Grounded directly in hyper-util's connection pool (`PoolInner::put`,
//! `waiters: HashMap<K, VecDeque<oneshot::Sender<T>>>`): a push first tries
//! to satisfy the oldest live waiter before it ever touches the deque
//! itself, which is what guarantees a blocked borrower is served in the
//! order it blocked rather than racing a fresh caller for a newly returned
//! object.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::pooled_object::Meta;

/// One idle slot: the bookkeeping record plus the value it guards.
pub(crate) struct Entry<T> {
    pub meta: Arc<Meta>,
    pub value: T,
}

struct State<T> {
    items: VecDeque<Entry<T>>,
    waiters: VecDeque<oneshot::Sender<Entry<T>>>,
}

pub(crate) struct IdleDeque<T> {
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> IdleDeque<T> {
    pub fn new() -> Self {
        Self { state: Mutex::new(State { items: VecDeque::new(), waiters: VecDeque::new() }) }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Parks `entry` so the next reuse order gives it out first (used for
    /// LIFO returns and for an evictor reinserting at the head).
    pub fn push_front(&self, entry: Entry<T>) {
        self.push(entry, true);
    }

    /// Parks `entry` at the back of the reuse order (used for FIFO
    /// returns).
    pub fn push_back(&self, entry: Entry<T>) {
        self.push(entry, false);
    }

    fn push(&self, entry: Entry<T>, front: bool) {
        let mut state = self.state.lock();
        let mut entry = entry;
        while let Some(tx) = state.waiters.pop_front() {
            match tx.send(entry) {
                Ok(()) => return,
                Err(returned) => entry = returned,
            }
        }
        if front {
            state.items.push_front(entry);
        } else {
            state.items.push_back(entry);
        }
    }

    /// Non-blocking pop from the front (the next entry to hand a
    /// borrower).
    pub fn try_pop_front(&self) -> Option<Entry<T>> {
        self.state.lock().items.pop_front()
    }

    /// Non-blocking pop from the back, used by the evictor to walk the
    /// idle set oldest-to-youngest when `lifo` pools park newest-at-front.
    pub fn try_pop_back(&self) -> Option<Entry<T>> {
        self.state.lock().items.pop_back()
    }

    /// Waits for an entry to become available, registering as a FIFO
    /// waiter if none is immediately available. `None` on timeout.
    pub async fn wait_pop_front(&self, timeout: Option<Duration>) -> Option<Entry<T>> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(entry) = state.items.pop_front() {
                return Some(entry);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        match timeout {
            Some(duration) => tokio::time::timeout(duration, rx).await.ok().and_then(std::result::Result::ok),
            None => rx.await.ok(),
        }
    }

    /// Drains every idle entry, for `clear`.
    pub fn drain(&self) -> Vec<Entry<T>> {
        self.state.lock().items.drain(..).collect()
    }

    /// Drains every idle entry and drops every registered waiter, for
    /// `Pool::close`. Dropping a waiter's `oneshot::Sender` without sending
    /// wakes its receiver with an error, which `Pool::borrow_object` turns
    /// into `Error::PoolClosed` rather than leaving the caller blocked
    /// forever.
    pub fn close(&self) -> Vec<Entry<T>> {
        let mut state = self.state.lock();
        state.waiters.clear();
        state.items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn entry(value: u32) -> Entry<u32> {
        Entry { meta: Arc::new(Meta::new()), value }
    }

    #[test]
    fn push_then_pop_is_fifo_for_back_insertion() {
        let deque: IdleDeque<u32> = IdleDeque::new();
        deque.push_back(entry(1));
        deque.push_back(entry(2));
        assert_eq!(deque.try_pop_front().unwrap().value, 1);
        assert_eq!(deque.try_pop_front().unwrap().value, 2);
    }

    #[test]
    fn push_front_is_lifo() {
        let deque: IdleDeque<u32> = IdleDeque::new();
        deque.push_front(entry(1));
        deque.push_front(entry(2));
        assert_eq!(deque.try_pop_front().unwrap().value, 2);
        assert_eq!(deque.try_pop_front().unwrap().value, 1);
    }

    #[tokio::test]
    async fn waiters_are_served_in_registration_order() {
        let deque: Arc<IdleDeque<u32>> = Arc::new(IdleDeque::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..3u32 {
            let deque = deque.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                // stagger registration so the waiter queue order is deterministic
                tokio::time::sleep(Duration::from_millis(u64::from(id) * 10)).await;
                let got = deque.wait_pop_front(Some(Duration::from_secs(5))).await.unwrap();
                order.lock().push(id);
                got.value
            }));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        deque.push_back(entry(100));
        deque.push_back(entry(200));
        deque.push_back(entry(300));

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, vec![100, 200, 300]);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn wait_pop_front_times_out_when_nothing_arrives() {
        let deque: IdleDeque<u32> = IdleDeque::new();
        let got = deque.wait_pop_front(Some(Duration::from_millis(20))).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn close_wakes_waiters_with_none() {
        let deque: Arc<IdleDeque<u32>> = Arc::new(IdleDeque::new());
        let waiter = {
            let deque = deque.clone();
            tokio::spawn(async move { deque.wait_pop_front(None).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(deque.close().len(), 0);
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[test]
    fn close_drains_idle_items() {
        let deque: IdleDeque<u32> = IdleDeque::new();
        deque.push_back(entry(1));
        deque.push_back(entry(2));
        assert_eq!(deque.close().len(), 2);
        assert_eq!(deque.len(), 0);
    }

    #[test]
    fn drain_empties_the_deque() {
        let deque: IdleDeque<u32> = IdleDeque::new();
        deque.push_back(entry(1));
        deque.push_back(entry(2));
        assert_eq!(deque.drain().len(), 2);
        assert_eq!(deque.len(), 0);
    }

    #[test]
    fn pop_back_walks_from_the_oldest_end_for_lifo_pools() {
        let deque: IdleDeque<u32> = IdleDeque::new();
        // LIFO returns push_front, so push_front(1) then push_front(2)
        // leaves 1 (the oldest) at the back.
        deque.push_front(entry(1));
        deque.push_front(entry(2));
        assert_eq!(deque.try_pop_back().unwrap().value, 1);
    }

    #[test]
    fn counts_track_pushes_and_pops() {
        let counter = AtomicU32::new(0);
        let deque: IdleDeque<u32> = IdleDeque::new();
        for i in 0..5 {
            deque.push_back(entry(i));
            counter.fetch_add(1, Ordering::Relaxed);
        }
        assert_eq!(deque.len(), 5);
    }
}
