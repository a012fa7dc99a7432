//! Property test for the core borrow/return invariant: `active + idle <=
//! max_total` holds after any sequence of borrows and returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use genpool::{Factory, Pool, PoolConfig, Result, WhenExhausted};
use proptest::prelude::*;

struct CountingFactory {
    next: AtomicU64,
}

impl CountingFactory {
    fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }
}

impl Factory for CountingFactory {
    type Instance = u64;

    async fn make(&self) -> Result<u64> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn active_plus_idle_never_exceeds_max_total(
        max_total in 1usize..8,
        ops in proptest::collection::vec(prop_oneof![Just(true), Just(false)], 1..30),
        lifo in any::<bool>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        rt.block_on(async {
            let config = PoolConfig {
                max_total: Some(max_total),
                max_idle: Some(max_total),
                min_idle: 0,
                max_wait: Some(Duration::from_millis(20)),
                when_exhausted: WhenExhausted::Block,
                lifo,
                ..PoolConfig::default()
            };
            let pool = Pool::new(CountingFactory::new(), config).unwrap();
            let mut guards = Vec::new();

            for op_is_borrow in &ops {
                if *op_is_borrow {
                    if let Ok(guard) = pool.borrow_object().await {
                        guards.push(guard);
                    }
                } else if !guards.is_empty() {
                    guards.pop();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }

                let stats = pool.stats();
                prop_assert!(
                    stats.active + stats.idle <= max_total,
                    "invariant violated: active={} + idle={} > max_total={}",
                    stats.active, stats.idle, max_total,
                );
            }

            drop(guards);
            tokio::time::sleep(Duration::from_millis(50)).await;

            let final_stats = pool.stats();
            prop_assert!(final_stats.active + final_stats.idle <= max_total);
            prop_assert_eq!(final_stats.active, 0, "all guards dropped, active should be 0");

            Ok(())
        })?;
    }
}

/// Deterministic companion: rapid borrow/return cycles never overshoot
/// `max_total`, and the idle count settles back at its cap.
#[tokio::test]
async fn rapid_borrow_return_preserves_the_invariant() {
    let max_total = 4;
    let config = PoolConfig {
        max_total: Some(max_total),
        max_idle: Some(max_total),
        when_exhausted: WhenExhausted::Block,
        max_wait: Some(Duration::from_millis(200)),
        ..PoolConfig::default()
    };
    let pool = Pool::new(CountingFactory::new(), config).unwrap();

    for _ in 0..20 {
        let guard = pool.borrow_object().await.unwrap();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let stats = pool.stats();
        assert!(stats.active + stats.idle <= max_total);
    }

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.idle, 1);
}
