//! Rate limiting against counters shared by many processes.
//!
//! The algorithm is the same sliding window as the [`local`](crate::local)
//! engine, but every `(key, rule)` evaluation is a single atomic operation on
//! a [`CounterStore`], so two processes can never both be told "under limit"
//! once the shared count has reached the limit.
//!
//! # Stores
//!
//! - [`RedisCounterStore`](crate::RedisCounterStore) (feature `redis-tokio`):
//!   a server-side Lua script per evaluation.
//! - [`MemoryCounterStore`]: the same keyspace and expiry rules under one
//!   mutex, for tests and single-process sharing.
//!
//! # Bucket keys
//!
//! `<prefix>:{<key>}:<window_seconds>:<precision>:<bucket_start>`, each with a
//! time-to-live of `window_seconds + bucket_width` refreshed on every write, so
//! exhausted buckets disappear without a sweeper.

pub(crate) mod common;

mod counter_store;
pub use counter_store::*;

mod distributed_rate_limiter;
pub use distributed_rate_limiter::*;

mod distributed_rate_limiter_factory;
pub use distributed_rate_limiter_factory::*;
