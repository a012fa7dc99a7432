//! A factory whose `make` fails intermittently, showing how a failed
//! creation surfaces as `Error::FactoryFailure` without leaking a claimed
//! capacity slot.

use std::sync::atomic::{AtomicU32, Ordering};

use genpool::{Error, Factory, Pool, PoolConfig, Result, WhenExhausted};

struct FlakyFactory {
    attempts: AtomicU32,
}

impl Factory for FlakyFactory {
    type Instance = u32;

    async fn make(&self) -> Result<u32> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt % 2 == 0 {
            return Err(Error::factory("make", "upstream refused connection"));
        }
        Ok(attempt)
    }
}

#[tokio::main]
async fn main() {
    println!("=== failing_factory ===\n");

    let config = PoolConfig { max_total: Some(4), when_exhausted: WhenExhausted::Fail, ..PoolConfig::default() };
    let factory = FlakyFactory { attempts: AtomicU32::new(0) };
    let pool = Pool::new(factory, config).unwrap();

    for i in 0..4 {
        match pool.borrow_object().await {
            Ok(guard) => println!("borrow {i}: succeeded with instance {}", *guard),
            Err(err) => println!("borrow {i}: failed with {err}"),
        }
        println!("stats: {:?}", pool.stats());
    }

    pool.close().await;
}
