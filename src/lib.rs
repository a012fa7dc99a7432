//! A generic, thread-safe, async object pool.
//!
//! Bounded total/idle capacity, borrow/return/idle validation hooks, a
//! background evictor, and FIFO fairness for blocked borrowers — the
//! Apache Commons Pool2 feature set, reworked around Rust ownership:
//! borrowing returns an RAII [`Guard`] instead of a bare value, and
//! returning happens on drop rather than via an explicit call.
//!
//! ```no_run
//! use genpool::{Factory, Pool, PoolConfig, Result};
//!
//! struct Connections;
//!
//! impl Factory for Connections {
//!     type Instance = u64;
//!
//!     async fn make(&self) -> Result<u64> {
//!         Ok(42)
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let pool = Pool::new(Connections, PoolConfig::default())?;
//! let conn = pool.borrow_object().await?;
//! assert_eq!(*conn, 42);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod factory;
mod guard;
mod idle_deque;
mod pool;
mod pooled_object;
mod scheduler;

pub use config::{PoolConfig, WhenExhausted};
pub use error::{Error, Result};
pub use factory::Factory;
pub use guard::Guard;
pub use pool::{Pool, PoolStats};
