//! # cron-mutex
//!
//! Distributed mutual exclusion for periodically scheduled jobs.
//!
//! Run the same binary on any number of replicas; each scheduled occurrence of
//! a job executes on at most one of them. The only coordination channel is a
//! shared Redis instance; replicas never talk to each other.
//!
//! ## How the lock works
//!
//! Before running a job, a replica issues one atomic `SET key value NX PX ttl`
//! against the shared store. The TTL is derived from the job's own schedule:
//! the time until the *next* fire, inflated by a configurable lag factor
//! (default 0.5) that absorbs clock skew and scheduler jitter between
//! replicas. The lock therefore self-expires just past the point it would be
//! needed again, with no renewal and no heartbeat, and a replica that crashes
//! mid-hold heals itself at lease end. The trade-off: a job whose runtime
//! exceeds its lease can be picked up by a second replica mid-run.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cron_mutex::{Cron, MutexConfig, RedisLockStore, StoreConfig, WorkError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let conf = MutexConfig {
//!         store: StoreConfig {
//!             host: "127.0.0.1".to_string(),
//!             port: 6379,
//!             password: String::new(),
//!         },
//!         ..Default::default()
//!     };
//!
//!     let store = RedisLockStore::connect(&conf.store).await.unwrap();
//!     let mut cron = Cron::new(conf, store);
//!
//!     // 6-field cron expression: sec min hour dom month dow.
//!     cron.register("0 */5 * * * *", "backup", |_ctx| async move {
//!         // ... do the work ...
//!         Ok::<(), WorkError>(())
//!     })
//!     .unwrap();
//!
//!     cron.run().await.unwrap();
//! }
//! ```
//!
//! ## Guarantees and non-guarantees
//!
//! - At most one replica runs a given occurrence while the lock store is
//!   reachable. Under a store outage the behavior follows the configured
//!   [`OutagePolicy`]: fail-open (default) degrades to every replica running,
//!   fail-closed degrades to no replica running.
//! - Job results are not persisted and failed runs are not retried; outcomes
//!   are visible through logs only.

pub mod config;
pub mod error;
pub mod mutex;
pub mod redis_impls;
pub mod runner;
pub mod schedule;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::{MutexConfig, OutagePolicy, StoreConfig};
pub use error::CronError;
pub use mutex::CronMutex;
pub use redis_impls::RedisLockStore;
pub use runner::{Cron, WorkError};
pub use traits::LockStore;
