//! Shutdown semantics: `close()` wakes blocked borrowers, is idempotent,
//! and further borrows fail with `PoolClosed`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use genpool::{Error, Factory, Pool, PoolConfig, Result, WhenExhausted};

struct CountingFactory {
    next: AtomicU32,
    destroyed: AtomicU32,
}

impl CountingFactory {
    fn new() -> Self {
        Self { next: AtomicU32::new(0), destroyed: AtomicU32::new(0) }
    }
}

impl Factory for CountingFactory {
    type Instance = u32;

    async fn make(&self) -> Result<u32> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    async fn destroy(&self, _instance: u32) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn borrowing_after_close_fails_with_pool_closed() {
    let pool = Pool::new(CountingFactory::new(), PoolConfig::default()).unwrap();
    pool.close().await;

    let err = pool.borrow_object().await.unwrap_err();
    assert!(matches!(err, Error::PoolClosed));
}

#[tokio::test]
async fn close_is_idempotent() {
    let pool = Pool::new(CountingFactory::new(), PoolConfig::default()).unwrap();
    let guard = pool.borrow_object().await.unwrap();
    drop(guard);
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.close().await;
    pool.close().await;
    assert!(pool.is_closed());
}

#[tokio::test]
async fn close_destroys_every_idle_member() {
    let pool = Pool::new(CountingFactory::new(), PoolConfig::default()).unwrap();

    let mut guards = Vec::new();
    for _ in 0..5 {
        guards.push(pool.borrow_object().await.unwrap());
    }
    for guard in guards {
        drop(guard);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.stats().idle, 5);

    pool.close().await;
    let stats = pool.stats();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.destroyed, 5);
}

#[tokio::test]
async fn a_blocked_borrower_is_woken_with_pool_closed_rather_than_hanging_forever() {
    let config = PoolConfig {
        max_total: Some(1),
        max_idle: Some(1),
        when_exhausted: WhenExhausted::Block,
        max_wait: None,
        ..PoolConfig::default()
    };
    let pool = std::sync::Arc::new(Pool::new(CountingFactory::new(), config).unwrap());

    let guard = pool.borrow_object().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.borrow_object().await });

    // give the waiter a chance to register itself as blocked before closing.
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close().await;

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::PoolClosed)));

    drop(guard);
}
