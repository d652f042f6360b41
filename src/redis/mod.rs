//! Redis-backed counter store for the distributed engine.
//!
//! Enables rate limiting across multiple processes or servers using Redis as a
//! shared backend. Every evaluation is one atomic Lua script.
//!
//! # Consistency Semantics
//!
//! - **Atomic evaluations:** increment, expiry refresh and window sum run as one script
//! - **Linearizable per key:** once a window is full, no concurrent caller is told
//!   "under limit", whichever process it runs in
//! - **No internal retries:** a failed round-trip is reported, never replayed, so a
//!   request is never counted twice by this crate
//!
//! # Examples
//!
//! ```ignore
//! use std::time::Duration;
//! use requota::{
//!     RateLimiterFactory, ReactiveRateLimiter, RedisRateLimiterFactory,
//!     RedisRateLimiterOptions, Rule, RuleSet,
//! };
//!
//! let client = redis::Client::open("redis://127.0.0.1:6379/")?;
//! let factory = RedisRateLimiterFactory::from_options(RedisRateLimiterOptions::new(client));
//!
//! let rules = RuleSet::new([
//!     Rule::of(Duration::from_secs(1), 10)?.with_name("burst"),
//!     Rule::of(Duration::from_secs(3600), 1_000)?.with_precision(60)?.with_name("hourly"),
//! ])?;
//!
//! let limiter = factory.get_instance_reactive(&rules)?;
//!
//! let result = limiter.is_over_limit_with_result_async("user_123").await?;
//! if result.over_limit {
//!     /* send 429, naming result.breached_rule_name() */
//! }
//!
//! factory.close();
//! ```

mod common;
pub use common::*;

mod redis_counter_store;
pub use redis_counter_store::*;
