//! Basic usage: build a pool over a toy connection factory, borrow and
//! return an object, and print the resulting stats.

use std::time::Duration;

use genpool::{Factory, Pool, PoolConfig, Result};

struct Connection {
    id: u32,
}

struct ConnectionFactory {
    next_id: std::sync::atomic::AtomicU32,
}

impl Factory for ConnectionFactory {
    type Instance = Connection;

    async fn make(&self) -> Result<Connection> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Connection { id })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== simple_pool ===\n");

    let config = PoolConfig { max_total: Some(10), min_idle: 2, ..PoolConfig::default() };
    let factory = ConnectionFactory { next_id: std::sync::atomic::AtomicU32::new(0) };
    let pool = Pool::new(factory, config)?;

    println!("borrowing a connection...");
    let conn = pool.borrow_object().await?;
    println!("got connection {}", conn.id);

    let stats = pool.stats();
    println!("active={} idle={} created={}", stats.active, stats.idle, stats.created);

    drop(conn);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = pool.stats();
    println!("after return: active={} idle={}", stats.active, stats.idle);

    pool.close().await;
    Ok(())
}
